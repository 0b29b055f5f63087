//! HDMI matrix protocol
//!
//! The HDMI matrix speaks `\r\n`-terminated ASCII at 57600 baud. Commands
//! start with `>@`, and the matrix echoes changes with `<@`.
//!
//! # Commands
//! - `>@R8006` - Read the full output table
//! - `>@WVSO[OO]I[II]` - Route input `II` to output `OO` (1-based)
//!
//! # Responses
//! - `OUT CHANGE SET[01][02]...[08]` - One 1-based input per output
//! - `<@WVSO[OO]I[II]` - A route changed (ours or the front panel's)
//! - `=====...` - Power-up banner

use crate::error::ParseError;
use crate::framing::Framing;
use crate::{one_based_ports, two_digit_fields, MatrixProtocol, Protocol, MATRIX_PORTS};

/// HDMI serial baud rate
pub const BAUD_RATE: u32 = 57600;

/// Request for the full output table
pub const FULL_UPDATE_REQUEST: &str = ">@R8006";

/// Prefix of the full output table response
pub const FULL_UPDATE_PREFIX: &str = "OUT CHANGE SET";

/// Prefix of a route-change notification
pub const ROUTE_CHANGED_PREFIX: &str = "<@WVSO";

/// HDMI matrix protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct HdmiProtocol;

impl MatrixProtocol for HdmiProtocol {
    fn protocol(&self) -> Protocol {
        Protocol::Hdmi
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
        message.starts_with(FULL_UPDATE_PREFIX)
    }

    fn is_full_update_trigger(&self, message: &str) -> bool {
        message.starts_with(ROUTE_CHANGED_PREFIX) || is_banner(message)
    }

    fn parse_full_update(&self, message: &str) -> Result<Vec<u8>, ParseError> {
        let payload = message
            .strip_prefix(FULL_UPDATE_PREFIX)
            .ok_or_else(|| ParseError::NotFullUpdate(message.to_string()))?;

        one_based_ports(
            &two_digit_fields(payload),
            self.num_outputs(),
            self.num_inputs(),
        )
    }

    fn encode_set_output(&self, output: u8, input: u8) -> Vec<u8> {
        format!(">@WVSO[0{}]I[0{}]\r\n", output + 1, input + 1).into_bytes()
    }
}

/// The power-up banner is a line made only of `=`
fn is_banner(message: &str) -> bool {
    !message.is_empty() && message.bytes().all(|b| b == b'=')
}

/// Format a full-update response for the given 0-based state
///
/// Used by simulated matrices.
pub fn format_full_update(outputs: &[u8]) -> String {
    let mut response = String::from(FULL_UPDATE_PREFIX);
    for input in outputs.iter().take(MATRIX_PORTS) {
        response.push_str(&format!("[{:02}]", input + 1));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Incoming;

    #[test]
    fn test_full_update_request() {
        assert_eq!(
            HdmiProtocol.full_update_request().unwrap(),
            b">@R8006\r\n".to_vec()
        );
    }

    #[test]
    fn test_parse_full_update() {
        let state = HdmiProtocol
            .parse_full_update("OUT CHANGE SET[01][01][02][03][04][05][06][07]")
            .unwrap();
        assert_eq!(state, vec![0, 0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_parse_full_update_ignores_extra_fields() {
        let state = HdmiProtocol
            .parse_full_update("OUT CHANGE SET[08][07][06][05][04][03][02][01][01]")
            .unwrap();
        assert_eq!(state, vec![7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_parse_full_update_too_short() {
        let err = HdmiProtocol
            .parse_full_update("OUT CHANGE SET[01][02]")
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::FieldCount {
                expected: 8,
                found: 2
            }
        );
    }

    #[test]
    fn test_parse_full_update_out_of_range() {
        let err = HdmiProtocol
            .parse_full_update("OUT CHANGE SET[01][02][03][04][05][06][07][09]")
            .unwrap_err();
        assert_eq!(err, ParseError::OutOfRange { value: 9, max: 8 });
    }

    #[test]
    fn test_parse_rejects_other_messages() {
        assert!(matches!(
            HdmiProtocol.parse_full_update("<@WVSO[01]I[02]"),
            Err(ParseError::NotFullUpdate(_))
        ));
    }

    #[test]
    fn test_encode_set_output() {
        assert_eq!(
            HdmiProtocol.encode_set_output(1, 6),
            b">@WVSO[02]I[07]\r\n".to_vec()
        );
    }

    #[test]
    fn test_triggers() {
        assert!(HdmiProtocol.is_full_update_trigger("<@WVSO[02]I[07]"));
        assert!(HdmiProtocol.is_full_update_trigger("=================================="));
        assert!(!HdmiProtocol.is_full_update_trigger(""));
        assert!(!HdmiProtocol.is_full_update_trigger("== HDMI =="));
        assert!(!HdmiProtocol.is_full_update_trigger("OUT CHANGE SET"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            HdmiProtocol.classify("OUT CHANGE SET[01][01][01][01][01][01][01][01]"),
            Incoming::FullUpdate
        );
        assert_eq!(HdmiProtocol.classify("<@WVSO[01]I[01]"), Incoming::Trigger);
        assert_eq!(HdmiProtocol.classify("hello"), Incoming::Other);
    }

    #[test]
    fn test_format_full_update_parses_back() {
        let state = vec![3, 1, 4, 1, 5, 0, 2, 6];
        let response = format_full_update(&state);
        assert_eq!(HdmiProtocol.parse_full_update(&response).unwrap(), state);
    }
}
