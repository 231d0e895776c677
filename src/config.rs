//! Runtime configuration.

use thiserror::Error;

use crate::failure::FailureMode;

pub const ENV_HEAP_INITIAL: &str = "LAMA_HEAP_INITIAL";
pub const ENV_HEAP_MAX: &str = "LAMA_HEAP_MAX";
pub const ENV_FAILURE: &str = "LAMA_FAILURE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive number of words, got {value:?}")]
    InvalidSize { var: &'static str, value: String },

    #[error("initial heap size {initial} exceeds the maximum {max}")]
    InitialAboveMax { initial: usize, max: usize },

    #[error("LAMA_FAILURE must be `exit` or `panic`, got {0:?}")]
    InvalidFailureMode(String),
}

/// Heap sizing and failure behaviour of a [crate::Runtime].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RuntimeConfig {
    /// Words available for allocation before the first collection.
    pub initial_heap_words: usize,
    /// Words reserved for the arena. The heap never grows past this.
    pub max_heap_words: usize,
    /// Fraction of the soft limit that must be free after a collection, otherwise the limit
    /// grows.
    pub min_free_ratio: f64,
    pub failure_mode: FailureMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            initial_heap_words: 64 * 1024,
            max_heap_words: 128 * 1024 * 1024,
            min_free_ratio: 0.5,
            failure_mode: FailureMode::Exit,
        }
    }
}

impl RuntimeConfig {
    /// A heap that never grows: useful to force collections.
    pub fn fixed(words: usize) -> Self {
        Self {
            initial_heap_words: words,
            max_heap_words: words,
            ..Self::default()
        }
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Reads overrides from `LAMA_HEAP_INITIAL`, `LAMA_HEAP_MAX` and `LAMA_FAILURE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_HEAP_INITIAL) {
            config.initial_heap_words = parse_words(ENV_HEAP_INITIAL, &value)?;
        }

        if let Some(value) = lookup(ENV_HEAP_MAX) {
            config.max_heap_words = parse_words(ENV_HEAP_MAX, &value)?;
        } else if config.initial_heap_words > config.max_heap_words {
            config.max_heap_words = config.initial_heap_words;
        }

        if let Some(value) = lookup(ENV_FAILURE) {
            config.failure_mode = match value.trim() {
                "exit" => FailureMode::Exit,
                "panic" => FailureMode::Panic,
                _ => return Err(ConfigError::InvalidFailureMode(value)),
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, words) in [
            (ENV_HEAP_INITIAL, self.initial_heap_words),
            (ENV_HEAP_MAX, self.max_heap_words),
        ] {
            if words == 0 {
                return Err(ConfigError::InvalidSize {
                    var,
                    value: words.to_string(),
                });
            }
        }
        if self.initial_heap_words > self.max_heap_words {
            return Err(ConfigError::InitialAboveMax {
                initial: self.initial_heap_words,
                max: self.max_heap_words,
            });
        }
        Ok(())
    }
}

fn parse_words(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(words) if words > 0 => Ok(words),
        _ => Err(ConfigError::InvalidSize {
            var,
            value: value.to_string(),
        }),
    }
}
