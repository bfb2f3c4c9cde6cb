//! Common error types for SPX

use thiserror::Error;

/// Common result type for SPX operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the SPX crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lever file could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Lever loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input value (e.g. unknown section name)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
