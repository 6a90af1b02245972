//! Common error types for the kiosk workspace

use thiserror::Error;

/// Common result type for kiosk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the kiosk crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error in a configuration file
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input (malformed URL, empty identity, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
