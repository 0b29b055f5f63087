//! AV Matrix Simulation Library
//!
//! This crate provides simulated matrix switchers for testing the router
//! without hardware. It includes:
//!
//! - **VirtualMatrix**: Applies wire commands and produces the device's replies
//! - **spawn_simulated**: Serves a virtual matrix over an in-memory cable
//!
//! # Example
//!
//! ```rust
//! use av_protocol::Protocol;
//! use av_sim::VirtualMatrix;
//!
//! let mut matrix = VirtualMatrix::with_identity(Protocol::Hdmi);
//! matrix.process_bytes(b">@WVSO[01]I[03]\r\n");
//!
//! while let Some(bytes) = matrix.take_output() {
//!     println!("Matrix output: {:?}", String::from_utf8_lossy(&bytes));
//! }
//! assert_eq!(matrix.outputs()[0], 2);
//! ```

pub mod matrix;
pub mod matrix_task;

pub use matrix::VirtualMatrix;
pub use matrix_task::{
    run_virtual_matrix_task, spawn_matrix, spawn_simulated, SimulatedMatrix, VirtualMatrixCommand,
};
