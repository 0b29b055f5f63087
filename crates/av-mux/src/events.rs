//! Events emitted by the matrix drivers
//!
//! Both drivers share one event channel. The state publisher listens for
//! state changes; everything else is for logging and the console.

use crate::state::{DriverId, DriverStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixEvent {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// A driver moved between connection states
    StatusChanged {
        driver: DriverId,
        status: DriverStatus,
    },

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------
    /// The physical output-to-input mapping was updated from the device
    StateChanged { driver: DriverId, outputs: Vec<u8> },

    // -------------------------------------------------------------------------
    // Faults
    // -------------------------------------------------------------------------
    /// A command was dropped after exhausting its retries
    CommandFailed { driver: DriverId, attempts: u32 },

    /// Reading from or writing to the device failed
    TransportError { driver: DriverId, message: String },
}

impl MatrixEvent {
    /// Driver that produced this event
    pub fn driver(&self) -> DriverId {
        match self {
            MatrixEvent::StatusChanged { driver, .. }
            | MatrixEvent::StateChanged { driver, .. }
            | MatrixEvent::CommandFailed { driver, .. }
            | MatrixEvent::TransportError { driver, .. } => *driver,
        }
    }

    pub fn is_state_change(&self) -> bool {
        matches!(self, MatrixEvent::StateChanged { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MatrixEvent::CommandFailed { .. } | MatrixEvent::TransportError { .. }
        )
    }
}
