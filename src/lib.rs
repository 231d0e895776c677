//! Runtime support library for compiled lama programs: the tagged value model, the managed
//! heap and its mark-compact collector, and the primitives compiled code calls into.

pub mod arena;
pub mod builders;
pub mod builtins;
pub mod config;
pub mod failure;
pub mod ffi;
pub mod gc;
pub mod header;
pub mod heap;
pub mod objmap;
pub mod patterns;
pub mod print;
pub mod roots;
pub mod runtime;
pub mod tag_hash;
pub mod value;

pub use config::RuntimeConfig;
pub use failure::{fail, FailureMode, Fault};
pub use gc::GcStats;
pub use header::{Header, Kind};
pub use heap::{Heap, ObjRef};
pub use print::Printed;
pub use roots::{RootWindow, ShadowStack, StackScanner};
pub use runtime::Runtime;
pub use tag_hash::{de_hash, tag_hash};
pub use value::Value;
