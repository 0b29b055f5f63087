//! AV Matrix Multiplexer
//!
//! This crate drives the HDMI and component matrices and maps virtual routes
//! onto them.
//!
//! # Architecture
//!
//! Each matrix gets its own driver task. A driver owns its transport, its
//! command queue and its physical state; nothing is shared between the two.
//!
//! - **Command queue**: one command in flight, 1500 ms ack timeout, five
//!   attempts with a 250 ms pause between them
//! - **Driver**: parses status messages, applies acks and resets, debounces
//!   full-update requests (35 ms)
//! - **Routing**: explicit virtual/physical conversion tables and the route
//!   planner
//! - **Publisher**: recomputes the virtual route vector 250 ms after the
//!   last state change
//!
//! # Example
//!
//! ```rust,no_run
//! use av_mux::{DriverId, MatrixDriver, Router, VirtualInput, VirtualOutput};
//! use av_protocol::Protocol;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), av_mux::MuxError> {
//! let (event_tx, event_rx) = mpsc::channel(256);
//!
//! let hdmi = MatrixDriver::new(DriverId::Hdmi, Protocol::Hdmi, event_tx.clone())
//!     .init("/dev/ttyUSB0")?;
//! let component = MatrixDriver::new(DriverId::Component, Protocol::Extron, event_tx)
//!     .init("/dev/ttyUSB1")?;
//!
//! let router = Router::start(hdmi, component, event_rx);
//! router.set_route(VirtualOutput::Tv4, VirtualInput::Scart2);
//! # Ok(())
//! # }
//! ```

pub mod debounce;
pub mod driver;
pub mod error;
pub mod events;
pub mod publisher;
pub mod queue;
pub mod router;
pub mod routing;
pub mod state;
pub mod transport;

// Re-export driver types
pub use driver::{
    run_driver, DriverAction, DriverCommand, DriverCore, MatrixControl, MatrixDriver,
    MatrixHandle, MatrixSnapshot, FULL_UPDATE_DEBOUNCE,
};

// Re-export queue types
pub use queue::{
    Command, CommandError, CommandQueue, CommandTicket, Completion, QueueConfig, TimeoutOutcome,
};

pub use debounce::Debouncer;
pub use error::MuxError;
pub use events::MatrixEvent;
pub use publisher::{StatePublisher, VirtualState, PUBLISH_DEBOUNCE};
pub use router::{RouteTickets, Router};
pub use routing::{
    compute_virtual_state, parse_virtual_input, parse_virtual_output, RouteError, RoutePlan,
    VirtualInput, VirtualOutput,
};
pub use state::{DriverId, DriverStatus, MatrixState};
pub use transport::MatrixTransport;
