//! Virtual matrix simulation
//!
//! Provides a simulated matrix switcher that accepts wire commands and
//! answers the way the real device does.

use std::collections::VecDeque;

use av_protocol::{extron, hdmi, sb, FrameCodec, Framing, Protocol, MATRIX_PORTS};
use tracing::{debug, trace};

/// A simulated matrix that produces protocol-accurate replies
#[derive(Debug)]
pub struct VirtualMatrix {
    /// Protocol the device speaks
    protocol: Protocol,
    /// Current 0-based input for each output
    outputs: Vec<u8>,
    /// Drop everything and never reply
    silent: bool,
    /// Partial command bytes
    splitter: CommandSplitter,
    /// Pending reply bytes (protocol-encoded)
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualMatrix {
    /// Create a virtual matrix with every output on input 0
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            outputs: vec![0; MATRIX_PORTS],
            silent: false,
            splitter: CommandSplitter::new(protocol),
            pending_output: VecDeque::new(),
        }
    }

    /// Create a virtual matrix with output `n` on input `n`
    pub fn with_identity(protocol: Protocol) -> Self {
        let mut matrix = Self::new(protocol);
        matrix.outputs = (0..MATRIX_PORTS as u8).collect();
        matrix
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Current 0-based input for each output
    pub fn outputs(&self) -> &[u8] {
        &self.outputs
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// A silent matrix swallows commands without applying or answering them
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Feed bytes written by the host
    ///
    /// Returns `true` if the routing changed.
    pub fn process_bytes(&mut self, data: &[u8]) -> bool {
        if self.silent {
            trace!("Silent {} matrix dropped {} bytes", self.protocol.name(), data.len());
            return false;
        }

        self.splitter.push_bytes(data);
        let mut changed = false;
        while let Some(command) = self.splitter.next_command() {
            changed |= self.process_command(&command);
        }
        changed
    }

    /// Change a route from the front panel and announce it
    pub fn front_panel(&mut self, output: u8, input: u8) -> bool {
        if !self.apply(output, input) {
            return false;
        }
        let notice = match self.protocol {
            Protocol::Hdmi => format!(
                "{}[0{}]I[0{}]\r\n",
                hdmi::ROUTE_CHANGED_PREFIX,
                output + 1,
                input + 1
            ),
            Protocol::Extron => "RECONFIG\r\n".to_string(),
            Protocol::Sb => sb::format_output_ack(output, input),
        };
        self.queue(notice);
        true
    }

    /// Check if there's pending output
    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    /// Take the next pending reply
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    fn process_command(&mut self, command: &str) -> bool {
        debug!("Virtual {} matrix received {:?}", self.protocol.name(), command);
        match self.protocol {
            Protocol::Hdmi => self.process_hdmi(command),
            Protocol::Extron => self.process_extron(command),
            Protocol::Sb => self.process_sb(command),
        }
    }

    fn process_hdmi(&mut self, command: &str) -> bool {
        if command == hdmi::FULL_UPDATE_REQUEST {
            let reply = format!("{}\r\n", hdmi::format_full_update(&self.outputs));
            self.queue(reply);
            return false;
        }

        let Some((output, input)) = parse_hdmi_set(command) else {
            return false;
        };
        let changed = self.apply(output, input);
        // The matrix echoes every accepted route
        let echo = format!(
            "{}[0{}]I[0{}]\r\n",
            hdmi::ROUTE_CHANGED_PREFIX,
            output + 1,
            input + 1
        );
        self.queue(echo);
        changed
    }

    fn process_extron(&mut self, command: &str) -> bool {
        if command == extron::FULL_UPDATE_REQUEST {
            let reply = format!("{}\r\n", extron::format_full_update(&self.outputs));
            self.queue(reply);
            return false;
        }

        let Some((output, input)) = parse_extron_tie(command) else {
            self.queue("E10\r\n".to_string());
            return false;
        };
        let changed = self.apply(output, input);
        self.queue(format!("{}\r\n", extron::format_tie_reply(output, input)));
        changed
    }

    fn process_sb(&mut self, command: &str) -> bool {
        match command {
            sb::RESET => {
                let changed = self.outputs.iter().any(|&input| input != 0);
                self.outputs.fill(0);
                self.queue(sb::RESET_ACK.to_string());
                changed
            }
            sb::SYSTEM_LOCK => {
                self.queue(sb::SYSTEM_LOCK.to_string());
                false
            }
            _ => match sb::parse_set_output(command) {
                Some((output, input)) => {
                    let changed = self.apply(output, input);
                    self.queue(sb::format_output_ack(output, input));
                    changed
                }
                None => false,
            },
        }
    }

    fn apply(&mut self, output: u8, input: u8) -> bool {
        if usize::from(input) >= MATRIX_PORTS {
            return false;
        }
        match self.outputs.get_mut(usize::from(output)) {
            Some(current) if *current != input => {
                *current = input;
                true
            }
            _ => false,
        }
    }

    fn queue(&mut self, reply: String) {
        trace!("Virtual {} matrix reply {:?}", self.protocol.name(), reply);
        self.pending_output.push_back(reply.into_bytes());
    }
}

/// `>@WVSO[0o]I[0i]` into 0-based `(output, input)`
fn parse_hdmi_set(command: &str) -> Option<(u8, u8)> {
    let rest = command.strip_prefix(">@WVSO")?;
    match rest.as_bytes() {
        [b'[', b'0', output, b']', b'I', b'[', b'0', input, b']'] => {
            let output = output.checked_sub(b'1').filter(|v| *v < 9)?;
            let input = input.checked_sub(b'1').filter(|v| *v < 9)?;
            Some((output, input))
        }
        _ => None,
    }
}

/// `{in}*{out}!` into 0-based `(output, input)`
fn parse_extron_tie(command: &str) -> Option<(u8, u8)> {
    let (input, output) = command.strip_suffix('!')?.split_once('*')?;
    let input: u8 = input.parse().ok()?;
    let output: u8 = output.parse().ok()?;
    Some((output.checked_sub(1)?, input.checked_sub(1)?))
}

/// Splits the host's byte stream into commands
///
/// Extron ties are terminated by `!` while its status request ends in a
/// line break, so it gets its own splitter.
#[derive(Debug)]
enum CommandSplitter {
    Framed(FrameCodec),
    Extron(Vec<u8>),
}

impl CommandSplitter {
    fn new(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Hdmi => Self::Framed(FrameCodec::new(Framing::CRLF)),
            Protocol::Sb => Self::Framed(FrameCodec::new(Framing::FixedLength(sb::FRAME_LEN))),
            Protocol::Extron => Self::Extron(Vec::new()),
        }
    }

    fn push_bytes(&mut self, data: &[u8]) {
        match self {
            Self::Framed(codec) => codec.push_bytes(data),
            Self::Extron(buffer) => buffer.extend_from_slice(data),
        }
    }

    fn next_command(&mut self) -> Option<String> {
        match self {
            Self::Framed(codec) => codec.next_message(),
            Self::Extron(buffer) => loop {
                let end = buffer.iter().position(|&b| b == b'!' || b == b'\n')?;
                let raw: Vec<u8> = buffer.drain(..=end).collect();
                let command = String::from_utf8_lossy(&raw);
                let command = command.trim();
                if !command.is_empty() {
                    return Some(command.to_string());
                }
            },
        }
    }
}
