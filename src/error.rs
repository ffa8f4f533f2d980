//! Errors raised by the instrumentation layer itself.
//!
//! Driver errors never pass through this type: the traced wrappers return the
//! driver's own error unchanged. These variants only cover configuration and
//! identity parsing, which happen before any statement is traced.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The connection URL could not be parsed.
    #[error("invalid connection url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A network database URL did not name a host.
    #[error("connection url for {system} has no host")]
    MissingHost { system: String },

    /// A boolean environment setting had an unrecognized value.
    #[error("invalid boolean for {key}: {value:?}")]
    InvalidBool { key: &'static str, value: String },

    /// A millisecond duration environment setting was not a number.
    #[error("invalid duration for {key}: {value:?}")]
    InvalidDuration { key: &'static str, value: String },
}

/// Result type for configuration and identity parsing.
pub type Result<T> = std::result::Result<T, Error>;
