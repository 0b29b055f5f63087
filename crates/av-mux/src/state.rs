//! Physical matrix state and driver identity

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which of the two matrices a driver controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverId {
    Hdmi,
    Component,
}

impl DriverId {
    pub fn name(&self) -> &'static str {
        match self {
            DriverId::Hdmi => "HDMI",
            DriverId::Component => "component",
        }
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection state of a matrix driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    /// No channel open (initial state, and after close or error)
    #[default]
    Disconnected,
    /// Opening the channel
    Connecting,
    /// Open with no command in flight
    Idle,
    /// A command has been written and its ack is outstanding
    AwaitingAck,
}

impl DriverStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, DriverStatus::Idle | DriverStatus::AwaitingAck)
    }
}

/// Output-to-input mapping of one physical matrix
///
/// Always holds exactly one entry per output, each a valid input index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixState {
    outputs: Vec<u8>,
    num_inputs: usize,
}

impl MatrixState {
    /// Identity routing: output `i` shows input `i % num_inputs`
    pub fn identity(num_outputs: usize, num_inputs: usize) -> Self {
        let num_inputs = num_inputs.max(1);
        let outputs = (0..num_outputs).map(|i| (i % num_inputs) as u8).collect();
        Self {
            outputs,
            num_inputs,
        }
    }

    pub fn outputs(&self) -> &[u8] {
        &self.outputs
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Route one output; returns `false` if either index is out of range
    pub fn set_output(&mut self, output: u8, input: u8) -> bool {
        if usize::from(input) >= self.num_inputs {
            return false;
        }
        match self.outputs.get_mut(usize::from(output)) {
            Some(slot) => {
                *slot = input;
                true
            }
            None => false,
        }
    }

    /// Every output back to input 0
    pub fn reset(&mut self) {
        self.outputs.iter_mut().for_each(|slot| *slot = 0);
    }

    /// Back to identity routing
    pub fn reset_identity(&mut self) {
        *self = Self::identity(self.outputs.len(), self.num_inputs);
    }

    /// Replace the whole mapping; rejected unless the shape and ranges fit
    pub fn replace(&mut self, outputs: Vec<u8>) -> bool {
        if outputs.len() != self.outputs.len()
            || outputs.iter().any(|&i| usize::from(i) >= self.num_inputs)
        {
            return false;
        }
        self.outputs = outputs;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(
            MatrixState::identity(8, 8).outputs(),
            &[0, 1, 2, 3, 4, 5, 6, 7]
        );
        assert_eq!(MatrixState::identity(6, 4).outputs(), &[0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_set_output_bounds() {
        let mut state = MatrixState::identity(8, 8);
        assert!(state.set_output(7, 2));
        assert_eq!(state.outputs()[7], 2);
        assert!(!state.set_output(8, 0));
        assert!(!state.set_output(0, 8));
        assert_eq!(state.outputs()[0], 0);
    }

    #[test]
    fn test_reset_zeroes() {
        let mut state = MatrixState::identity(8, 8);
        state.reset();
        assert!(state.outputs().iter().all(|&i| i == 0));
        state.reset_identity();
        assert_eq!(state, MatrixState::identity(8, 8));
    }

    #[test]
    fn test_replace_validates() {
        let mut state = MatrixState::identity(8, 8);
        assert!(!state.replace(vec![0; 7]));
        assert!(!state.replace(vec![0, 0, 0, 0, 0, 0, 0, 8]));
        assert_eq!(state, MatrixState::identity(8, 8));
        assert!(state.replace(vec![7; 8]));
        assert_eq!(state.outputs(), &[7; 8]);
    }

    #[test]
    fn test_status_connected() {
        assert!(!DriverStatus::Disconnected.is_connected());
        assert!(!DriverStatus::Connecting.is_connected());
        assert!(DriverStatus::Idle.is_connected());
        assert!(DriverStatus::AwaitingAck.is_connected());
    }
}
