//! Error types for matrix detection

use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// No port answered for one of the matrices
    #[error("could not find {0} matrix")]
    DeviceNotFound(&'static str),
}
