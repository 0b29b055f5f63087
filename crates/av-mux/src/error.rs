//! Error types for the matrix drivers

use thiserror::Error;

use crate::state::DriverId;

/// Errors that can occur bringing up a matrix driver
#[derive(Debug, Error)]
pub enum MuxError {
    /// Failed to open the serial port
    #[error("failed to open {driver} matrix on {path}: {source}")]
    OpenFailed {
        driver: DriverId,
        path: String,
        #[source]
        source: tokio_serial::Error,
    },
}
