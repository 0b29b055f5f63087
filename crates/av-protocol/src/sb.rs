//! SB component matrix protocol
//!
//! Fixed 8-byte ASCII records at 9600 baud with no delimiter. The device has
//! no "read everything" command; its state is tracked from per-output acks
//! and reset acks instead.
//!
//! # Commands
//! - `SBALLRST` - Reset every output to input 1
//! - `SBSYSMLK` - Bring-up command sent after the reset
//! - `SBI0iO0o` - Route input `i` to output `o` (1-based)
//!
//! # Responses
//! - `SBRSTACK` - Reset acknowledged
//! - `SBUDxiOo` - Output `o` now shows input `i` (1-based)

use crate::error::ParseError;
use crate::framing::Framing;
use crate::{MatrixProtocol, Protocol};

/// SB serial baud rate
pub const BAUD_RATE: u32 = 9600;

/// Record length in bytes
pub const FRAME_LEN: usize = 8;

/// Reset command
pub const RESET: &str = "SBALLRST";

/// Reset acknowledgment
pub const RESET_ACK: &str = "SBRSTACK";

/// Second bring-up command
pub const SYSTEM_LOCK: &str = "SBSYSMLK";

const UPDATE_PREFIX: &str = "SBUD";

/// SB component matrix protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct SbProtocol;

impl MatrixProtocol for SbProtocol {
    fn protocol(&self) -> Protocol {
        Protocol::Sb
    }

    fn baud_rate(&self) -> u32 {
        BAUD_RATE
    }

    fn framing(&self) -> Framing {
        Framing::FixedLength(FRAME_LEN)
    }

    fn full_update_request(&self) -> Option<Vec<u8>> {
        None
    }

    fn is_full_update_response(&self, _message: &str) -> bool {
        false
    }

    fn is_full_update_trigger(&self, _message: &str) -> bool {
        false
    }

    fn parse_full_update(&self, _message: &str) -> Result<Vec<u8>, ParseError> {
        Err(ParseError::Unsupported("SB"))
    }

    fn parse_output_ack(&self, message: &str) -> Option<(u8, u8)> {
        // SBUD, any digit, input digit, 'O', output digit
        message.match_indices(UPDATE_PREFIX).find_map(|(start, _)| {
            let record = message.as_bytes().get(start + UPDATE_PREFIX.len()..)?;
            match record {
                [d, input, b'O', output, ..]
                    if d.is_ascii_digit()
                        && input.is_ascii_digit()
                        && output.is_ascii_digit() =>
                {
                    let input = (input - b'0').checked_sub(1)?;
                    let output = (output - b'0').checked_sub(1)?;
                    (usize::from(input) < self.num_inputs()
                        && usize::from(output) < self.num_outputs())
                    .then_some((output, input))
                }
                _ => None,
            }
        })
    }

    fn is_reset_ack(&self, message: &str) -> bool {
        message.contains(RESET_ACK)
    }

    fn encode_set_output(&self, output: u8, input: u8) -> Vec<u8> {
        format!("SBI0{}O0{}", input + 1, output + 1).into_bytes()
    }

    fn bring_up_commands(&self) -> Vec<Vec<u8>> {
        vec![RESET.as_bytes().to_vec(), SYSTEM_LOCK.as_bytes().to_vec()]
    }

    fn probe_request(&self) -> Option<Vec<u8>> {
        Some(RESET.as_bytes().to_vec())
    }

    fn is_probe_response(&self, message: &str) -> bool {
        self.is_reset_ack(message)
    }
}

/// Format the ack for a route (0-based indices)
///
/// Used by simulated matrices.
pub fn format_output_ack(output: u8, input: u8) -> String {
    format!("{UPDATE_PREFIX}0{}O{}", input + 1, output + 1)
}

/// Parse an `SBI0iO0o` set command into 0-based `(output, input)`
pub fn parse_set_output(command: &str) -> Option<(u8, u8)> {
    match command.as_bytes() {
        [b'S', b'B', b'I', b'0', input, b'O', b'0', output] => {
            let input = input.checked_sub(b'1').filter(|v| *v < 9)?;
            let output = output.checked_sub(b'1').filter(|v| *v < 9)?;
            Some((output, input))
        }
        _ => None,
    }
}
