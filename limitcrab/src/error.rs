use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by engines, constructors, the factory and the strategy
/// manager.
#[derive(Error, Debug)]
pub enum Error {
    /// A required positive quantity was zero or negative, or a typed config
    /// value had the wrong shape.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A config map did not contain a key the constructor requires.
    #[error("missing config key: {0}")]
    MissingKey(String),

    /// A config map value could not be coerced to the requested type.
    #[error("config key {key}: expected {expected}, got {actual}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The requested strategy name is not registered.
    #[error("unsupported rate limiter strategy: {0}")]
    UnsupportedStrategy(String),

    /// The underlying eval/del failed, including deadline expiry. Never
    /// retried; surfaced verbatim with the engine name attached.
    #[error("{strategy}: store error: {source}")]
    Store {
        strategy: &'static str,
        #[source]
        source: StoreError,
    },

    /// The script returned an array of unexpected arity or element types.
    #[error("{strategy}: protocol error: {message}")]
    Protocol {
        strategy: &'static str,
        message: String,
    },

    /// Runtime strategy updates are a declared non-goal.
    #[error("strategy updates are not implemented - use configuration")]
    NotImplemented,
}

impl Error {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    pub(crate) fn protocol(strategy: &'static str, message: impl Into<String>) -> Self {
        Error::Protocol {
            strategy,
            message: message.into(),
        }
    }

    pub(crate) fn store(strategy: &'static str, source: StoreError) -> Self {
        Error::Store { strategy, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
