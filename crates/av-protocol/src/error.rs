//! Error types for matrix protocol parsing

use thiserror::Error;

/// Errors that can occur while parsing matrix messages
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Message does not match the full-update response pattern
    #[error("not a full-update response: {0:?}")]
    NotFullUpdate(String),

    /// Too few port fields in a full-update response
    #[error("expected {expected} port fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// A port field is outside the device's 1-based range
    #[error("port value {value} outside 1..={max}")]
    OutOfRange { value: u8, max: usize },

    /// The protocol has no full-update response at all
    #[error("{0} matrices do not report full updates")]
    Unsupported(&'static str),
}
