//! Incoming byte-stream framing
//!
//! Serial reads arrive in arbitrary chunks. A codec buffers them and hands
//! out one message per framed unit: either a delimiter-terminated line
//! (delimiter stripped) or a fixed-length record.

use tracing::warn;

/// Maximum message length before the line buffer is considered garbage
const MAX_FRAME_LEN: usize = 256;

/// How a protocol delimits its messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Messages end with this delimiter
    Line { delimiter: &'static [u8] },
    /// Every message is exactly this many bytes
    FixedLength(usize),
}

impl Framing {
    /// `\r\n`-terminated lines
    pub const CRLF: Framing = Framing::Line { delimiter: b"\r\n" };
}

/// Streaming delimiter-based codec
#[derive(Debug)]
pub struct LineCodec {
    delimiter: &'static [u8],
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a codec splitting on `delimiter`
    pub fn new(delimiter: &'static [u8]) -> Self {
        Self {
            delimiter,
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Push raw bytes into the buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A device that never sends the delimiter must not grow us forever
        if self.buffer.len() > MAX_FRAME_LEN * 4 && self.find_delimiter().is_none() {
            warn!(
                "Discarding {} bytes without a line delimiter",
                self.buffer.len() - MAX_FRAME_LEN
            );
            let start = self.buffer.len() - MAX_FRAME_LEN;
            self.buffer.drain(..start);
        }
    }

    /// Extract the next complete line, without its delimiter
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let pos = self.find_delimiter()?;
        let mut frame: Vec<u8> = self.buffer.drain(..pos + self.delimiter.len()).collect();
        frame.truncate(pos);
        Some(frame)
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn find_delimiter(&self) -> Option<usize> {
        if self.delimiter.is_empty() {
            return None;
        }
        self.buffer
            .windows(self.delimiter.len())
            .position(|w| w == self.delimiter)
    }
}

/// Streaming fixed-length record codec
#[derive(Debug)]
pub struct FixedLengthCodec {
    len: usize,
    buffer: Vec<u8>,
}

impl FixedLengthCodec {
    /// Create a codec emitting records of `len` bytes
    pub fn new(len: usize) -> Self {
        Self {
            len: len.max(1),
            buffer: Vec::with_capacity(len * 4),
        }
    }

    /// Push raw bytes into the buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete record
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buffer.len() < self.len {
            return None;
        }
        Some(self.buffer.drain(..self.len).collect())
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Framing codec chosen from a protocol's [`Framing`]
#[derive(Debug)]
pub enum FrameCodec {
    /// Delimiter-terminated lines
    Line(LineCodec),
    /// Fixed-length records
    FixedLength(FixedLengthCodec),
}

impl FrameCodec {
    /// Create a codec for the given framing
    pub fn new(framing: Framing) -> Self {
        match framing {
            Framing::Line { delimiter } => Self::Line(LineCodec::new(delimiter)),
            Framing::FixedLength(len) => Self::FixedLength(FixedLengthCodec::new(len)),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        match self {
            Self::Line(c) => c.push_bytes(data),
            Self::FixedLength(c) => c.push_bytes(data),
        }
    }

    /// Extract the next raw frame, if available
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        match self {
            Self::Line(c) => c.next_frame(),
            Self::FixedLength(c) => c.next_frame(),
        }
    }

    /// Extract the next frame decoded as text (lossy UTF-8)
    pub fn next_message(&mut self) -> Option<String> {
        self.next_frame()
            .map(|frame| String::from_utf8_lossy(&frame).into_owned())
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        match self {
            Self::Line(c) => c.clear(),
            Self::FixedLength(c) => c.clear(),
        }
    }
}
