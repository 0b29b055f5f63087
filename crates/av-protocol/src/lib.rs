//! AV Matrix Protocol Library
//!
//! This crate provides framing and encoding for the serial protocols spoken
//! by the two matrix switchers behind the router:
//!
//! - **HDMI**: ASCII `\r\n`-delimited lines, `>@` commands and `<@` replies
//! - **Extron**: ASCII `\r\n`-delimited lines (component matrix, variant a)
//! - **SB**: fixed 8-byte records (component matrix, variant b)
//!
//! # Architecture
//!
//! Each protocol module provides:
//! - Protocol constants (baud rate, framing, full-update request)
//! - Recognizers for full-update responses, triggers, per-output acks and resets
//! - Encoding of the "route input to output" command
//!
//! The byte stream itself is split into messages by a [`FrameCodec`], which
//! is chosen from the protocol's [`Framing`].
//!
//! # Example
//!
//! ```rust
//! use av_protocol::{create_protocol, FrameCodec, Incoming, Protocol};
//!
//! let hdmi = create_protocol(Protocol::Hdmi);
//! let mut codec = FrameCodec::new(hdmi.framing());
//! codec.push_bytes(b"OUT CHANGE SET[01][02][03][04][05][06][07][08]\r\n");
//!
//! let message = codec.next_message().unwrap();
//! assert_eq!(hdmi.classify(&message), Incoming::FullUpdate);
//! assert_eq!(
//!     hdmi.parse_full_update(&message).unwrap(),
//!     vec![0, 1, 2, 3, 4, 5, 6, 7]
//! );
//! ```

pub mod error;
pub mod extron;
pub mod framing;
pub mod hdmi;
pub mod sb;

pub use error::ParseError;
pub use framing::{FixedLengthCodec, FrameCodec, Framing, LineCodec};

/// Number of physical ports on each side of both matrices
pub const MATRIX_PORTS: usize = 8;

/// Identifies which serial protocol a matrix speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Protocol {
    /// HDMI matrix (`>@R8006` / `OUT CHANGE SET`)
    Hdmi,
    /// Extron component matrix, line-delimited ASCII
    Extron,
    /// SB component matrix, fixed 8-byte frames
    Sb,
}

impl Protocol {
    /// Returns a human-readable name for the protocol
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Hdmi => "HDMI",
            Protocol::Extron => "Extron",
            Protocol::Sb => "SB",
        }
    }
}

/// What a single framed message from a matrix means to its driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// A complete snapshot of the output-to-input mapping
    FullUpdate,
    /// One output changed (0-based indices)
    OutputAck { output: u8, input: u8 },
    /// The device reset every output to input 0
    Reset,
    /// Something changed that calls for a fresh full update
    Trigger,
    /// Chatter the driver does not care about
    Other,
}

/// Protocol constants and message recognizers for one matrix model
///
/// Implementations are stateless; the driver owns all mutable state.
pub trait MatrixProtocol: Send + Sync {
    /// Which protocol this is
    fn protocol(&self) -> Protocol;

    /// Serial baud rate
    fn baud_rate(&self) -> u32;

    /// How the incoming byte stream is split into messages
    fn framing(&self) -> Framing;

    /// Number of physical inputs
    fn num_inputs(&self) -> usize {
        MATRIX_PORTS
    }

    /// Number of physical outputs
    fn num_outputs(&self) -> usize {
        MATRIX_PORTS
    }

    /// Wire bytes asking the device for its full state, if it supports that
    fn full_update_request(&self) -> Option<Vec<u8>>;

    /// Whether the message is a full-update response
    fn is_full_update_response(&self, message: &str) -> bool;

    /// Whether the message should trigger a (debounced) full-update request
    fn is_full_update_trigger(&self, message: &str) -> bool;

    /// Parse a full-update response into one 0-based input per output
    fn parse_full_update(&self, message: &str) -> Result<Vec<u8>, ParseError>;

    /// Parse a per-output acknowledgment into 0-based `(output, input)`
    fn parse_output_ack(&self, _message: &str) -> Option<(u8, u8)> {
        None
    }

    /// Whether the message acknowledges a reset of every output
    fn is_reset_ack(&self, _message: &str) -> bool {
        false
    }

    /// Encode "route `input` to `output`" (0-based)
    fn encode_set_output(&self, output: u8, input: u8) -> Vec<u8>;

    /// Commands sent once when the channel opens
    fn bring_up_commands(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Bytes written when probing a port for this device
    fn probe_request(&self) -> Option<Vec<u8>> {
        self.full_update_request()
    }

    /// Whether a message received while probing identifies this device
    fn is_probe_response(&self, message: &str) -> bool {
        self.is_full_update_response(message)
    }

    /// Classify a message in dispatch order
    fn classify(&self, message: &str) -> Incoming {
        if self.is_full_update_response(message) {
            Incoming::FullUpdate
        } else if let Some((output, input)) = self.parse_output_ack(message) {
            Incoming::OutputAck { output, input }
        } else if self.is_reset_ack(message) {
            Incoming::Reset
        } else if self.is_full_update_trigger(message) {
            Incoming::Trigger
        } else {
            Incoming::Other
        }
    }
}

/// Create the protocol implementation for the given protocol
pub fn create_protocol(protocol: Protocol) -> Box<dyn MatrixProtocol> {
    match protocol {
        Protocol::Hdmi => Box::new(hdmi::HdmiProtocol),
        Protocol::Extron => Box::new(extron::ExtronProtocol),
        Protocol::Sb => Box::new(sb::SbProtocol),
    }
}

/// Collect every non-overlapping two-digit field in `text`, left to right
pub(crate) fn two_digit_fields(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut fields = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i].is_ascii_digit() && bytes[i + 1].is_ascii_digit() {
            fields.push((bytes[i] - b'0') * 10 + (bytes[i + 1] - b'0'));
            i += 2;
        } else {
            i += 1;
        }
    }
    fields
}

/// Convert 1-based port fields into a 0-based state vector of `count` entries
pub(crate) fn one_based_ports(
    fields: &[u8],
    count: usize,
    max: usize,
) -> Result<Vec<u8>, ParseError> {
    if fields.len() < count {
        return Err(ParseError::FieldCount {
            expected: count,
            found: fields.len(),
        });
    }

    fields[..count]
        .iter()
        .map(|&value| {
            if value == 0 || usize::from(value) > max {
                Err(ParseError::OutOfRange { value, max })
            } else {
                Ok(value - 1)
            }
        })
        .collect()
}
