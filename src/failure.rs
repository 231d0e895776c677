//! The single fatal error channel of the runtime.
//!
//! Compiled code has no way to resume after a runtime fault, so nothing in here returns:
//! [fail] reports the [Fault] and terminates the process. Embedders that need to observe the
//! fault (tests, mostly) can switch the process to [FailureMode::Panic].

use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

use crate::header::Kind;

/// Exit status used when the runtime gives up.
pub const FAILURE_EXIT_CODE: i32 = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("out of memory: requested {requested} words with {live} live words in a {capacity} word heap")]
    OutOfMemory {
        requested: usize,
        live: usize,
        capacity: usize,
    },

    #[error("allocation requested while the collector is running")]
    ReentrantAllocation,

    #[error("the runtime was entered again while it was busy")]
    ReentrantRuntime,

    #[error("unknown header tag {tag:#x} at {addr:#x}")]
    UnknownHeaderTag { tag: usize, addr: usize },

    #[error("tagHash: character not found: {0:?}")]
    TagHashCharacter(char),

    #[error("tagHash: constructor name {0:?} is longer than {1} characters")]
    TagHashTooLong(String, usize),

    #[error("tagHash: {0:?} <-> {1:?}")]
    TagHashMismatch(String, String),

    #[error("{op}: boxed value expected, got {value}")]
    NotBoxed { op: &'static str, value: isize },

    #[error("{op}: unboxed value expected, got {value:#x}")]
    NotUnboxed { op: &'static str, value: usize },

    #[error("{op}: {found} is not a valid object")]
    NotAnObject { op: &'static str, found: String },

    #[error("{op}: unexpected {found:?} object")]
    WrongKind { op: &'static str, found: Kind },

    #[error("{op}: index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        op: &'static str,
        index: isize,
        len: usize,
    },

    #[error("{op}: invalid length {len}")]
    InvalidLength { op: &'static str, len: isize },

    #[error("{0}")]
    BadInput(String),

    #[error("cannot map the heap arena: {0}")]
    Arena(String),

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Message(String),
}

/// What [fail] does once the fault has been reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Terminate the process with [FAILURE_EXIT_CODE].
    #[default]
    Exit,
    /// Panic with the fault message. Still never returns to the caller.
    Panic,
}

static MODE: AtomicU8 = AtomicU8::new(0);

/// Selects the process-wide failure mode.
pub fn set_mode(mode: FailureMode) {
    let raw = match mode {
        FailureMode::Exit => 0,
        FailureMode::Panic => 1,
    };
    MODE.store(raw, Ordering::Relaxed);
}

pub fn mode() -> FailureMode {
    match MODE.load(Ordering::Relaxed) {
        0 => FailureMode::Exit,
        _ => FailureMode::Panic,
    }
}

/// Reports `fault` and terminates.
#[cold]
#[inline(never)]
pub fn fail(fault: Fault) -> ! {
    tracing::error!(%fault, "fatal runtime fault");

    match mode() {
        FailureMode::Exit => {
            let mut stdout = std::io::stdout();
            let _ = stdout.flush();
            let _ = writeln!(std::io::stderr(), "*** FAILURE: {fault}");
            std::process::exit(FAILURE_EXIT_CODE)
        }
        FailureMode::Panic => panic!("*** FAILURE: {fault}"),
    }
}

/// Formats a message and fails with it, the Rust counterpart of the C `failure(fmt, ...)`.
#[macro_export]
macro_rules! failure {
    ($($arg:tt)*) => {
        $crate::failure::fail($crate::failure::Fault::Message(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let fault = Fault::IndexOutOfBounds {
            op: "elem",
            index: 5,
            len: 3,
        };
        assert_eq!(fault.to_string(), "elem: index 5 out of bounds for length 3");

        let fault = Fault::TagHashMismatch("_Foo".into(), "Foo".into());
        assert_eq!(fault.to_string(), "tagHash: \"_Foo\" <-> \"Foo\"");
    }

    #[test]
    #[should_panic(expected = "*** FAILURE: boom 42")]
    fn test_failure_macro_panics() {
        set_mode(FailureMode::Panic);
        failure!("boom {}", 42);
    }
}
