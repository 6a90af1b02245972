//! Error types for kiosk-display
//!
//! Nothing in the renderer is fatal at runtime: these errors are returned at component
//! boundaries, logged, and turned into "keep showing the last good frame".

use thiserror::Error;

/// Main error type for kiosk-display
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Media inspection or element errors
    #[error("Media error: {0}")]
    Media(String),

    /// Still-frame capture errors
    #[error("Capture error: {0}")]
    Capture(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Errors surfaced from kiosk-common
    #[error(transparent)]
    Common(#[from] kiosk_common::Error),
}

/// Freshness probe failures
///
/// `Unsupported` means the server cannot answer metadata-only requests for this asset;
/// everything else is a transient blip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("metadata probe not supported: {0}")]
    Unsupported(String),

    #[error("probe timed out")]
    Timeout,
}

/// Convenience Result type using kiosk-display Error
pub type Result<T> = std::result::Result<T, Error>;
