//! Extron component matrix protocol
//!
//! Line-oriented ASCII at 9600 baud. Commands are sent without a line
//! terminator except for the full-update request.
//!
//! # Commands
//! - `V0.` - Read the video and audio tie tables
//! - `{in}*{out}!` - Tie input to output (1-based)
//!
//! # Responses
//! - `01 02 03 04 05 06 07 08 Vid 01 02 03 04 05 06 07 08 Aud`
//! - `Out02 In07 All` - Reply to a tie
//! - `RECONFIG` - Front panel change
//! - `(c)Copyright 2003, Extron Electronics ...` - Power-up banner

use crate::error::ParseError;
use crate::framing::Framing;
use crate::{one_based_ports, MatrixProtocol, Protocol, MATRIX_PORTS};

/// Extron serial baud rate
pub const BAUD_RATE: u32 = 9600;

/// Request for the tie tables
pub const FULL_UPDATE_REQUEST: &str = "V0.";

const VIDEO_MARKER: &str = "Vid";
const AUDIO_MARKER: &str = "Aud";
const COPYRIGHT_PREFIX: &str = "(c)Copyright ";
const COPYRIGHT_SUFFIX: &str = ", Extron Electronics";

/// Extron component matrix protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtronProtocol;

impl MatrixProtocol for ExtronProtocol {
    fn protocol(&self) -> Protocol {
        Protocol::Extron
    }

    fn baud_rate(&self) -> u32 {
        BAUD_RATE
    }

    fn framing(&self) -> Framing {
        Framing::CRLF
    }

    fn full_update_request(&self) -> Option<Vec<u8>> {
        Some(format!("{FULL_UPDATE_REQUEST}\r\n").into_bytes())
    }

    fn is_full_update_response(&self, message: &str) -> bool {
        tie_table_fields(message).is_some()
    }

    fn is_full_update_trigger(&self, message: &str) -> bool {
        message == "RECONFIG" || is_tie_reply(message) || is_copyright_banner(message)
    }

    fn parse_full_update(&self, message: &str) -> Result<Vec<u8>, ParseError> {
        let fields = tie_table_fields(message)
            .ok_or_else(|| ParseError::NotFullUpdate(message.to_string()))?;

        // The video table comes first; the audio table follows it
        one_based_ports(&fields, self.num_outputs(), self.num_inputs())
    }

    fn encode_set_output(&self, output: u8, input: u8) -> Vec<u8> {
        format!("{}*{}!", input + 1, output + 1).into_bytes()
    }
}

fn is_two_digits(token: &str) -> bool {
    token.len() == 2 && token.bytes().all(|b| b.is_ascii_digit())
}

/// Split `NN x8 Vid NN x8 Aud` into its sixteen fields
fn tie_table_fields(message: &str) -> Option<Vec<u8>> {
    let tokens: Vec<&str> = message.split(' ').collect();
    if tokens.len() != MATRIX_PORTS * 2 + 2
        || tokens[MATRIX_PORTS] != VIDEO_MARKER
        || tokens[MATRIX_PORTS * 2 + 1] != AUDIO_MARKER
    {
        return None;
    }

    let fields = tokens[..MATRIX_PORTS]
        .iter()
        .chain(&tokens[MATRIX_PORTS + 1..MATRIX_PORTS * 2 + 1]);

    fields
        .map(|token| is_two_digits(token).then(|| token.parse().ok()).flatten())
        .collect()
}

/// `OutNN InNN` at the start of the line
fn is_tie_reply(message: &str) -> bool {
    let Some(rest) = message.strip_prefix("Out") else {
        return false;
    };
    match rest.as_bytes() {
        [o1, o2, b' ', b'I', b'n', i1, i2, ..] => {
            [o1, o2, i1, i2].iter().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// `(c)Copyright YYYY, Extron Electronics` at the start of the line
fn is_copyright_banner(message: &str) -> bool {
    let Some(rest) = message.strip_prefix(COPYRIGHT_PREFIX) else {
        return false;
    };
    rest.len() >= 4
        && rest.is_char_boundary(4)
        && rest[..4].bytes().all(|b| b.is_ascii_digit())
        && rest[4..].starts_with(COPYRIGHT_SUFFIX)
}

/// Format a tie table for the given 0-based state, audio following video
///
/// Used by simulated matrices.
pub fn format_full_update(outputs: &[u8]) -> String {
    let table: Vec<String> = outputs
        .iter()
        .take(MATRIX_PORTS)
        .map(|input| format!("{:02}", input + 1))
        .collect();
    let table = table.join(" ");
    format!("{table} {VIDEO_MARKER} {table} {AUDIO_MARKER}")
}

/// Format the reply to a tie command (0-based indices)
pub fn format_tie_reply(output: u8, input: u8) -> String {
    format!("Out{:02} In{:02} All", output + 1, input + 1)
}
