//! AV Matrix Detection Library
//!
//! This crate provides serial port enumeration, per-protocol probing and the
//! start-up discovery pass that decides which port belongs to which matrix.
//!
//! # Example
//!
//! ```rust,no_run
//! use av_detect::{discover_ports, DiscoveryRequest};
//! use av_protocol::Protocol;
//!
//! # async fn run() -> Result<(), av_detect::DetectError> {
//! let request = DiscoveryRequest::new(Protocol::Extron);
//! let assignment = discover_ports(&request).await?;
//!
//! println!("HDMI: {}", assignment.hdmi);
//! println!("Component: {}", assignment.component);
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod error;
pub mod probe;
pub mod scanner;

pub use discovery::{assign_ports, discover_ports, DiscoveryRequest, PortAssignment};
pub use error::DetectError;
pub use probe::{probe_port, probe_port_with_config, probe_stream, ProbeConfig};
pub use scanner::{PortScanner, ScannerConfig, SerialPortInfo};
