//! Byte transport to one matrix
//!
//! Generic over the I/O type so real serial ports and in-memory
//! `tokio::io::duplex` streams share the same driver code.

use std::io;

use av_protocol::{FrameCodec, Framing};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::trace;

/// Framed connection to a matrix
pub struct MatrixTransport<T> {
    name: String,
    io: T,
    codec: FrameCodec,
    buffer: Vec<u8>,
}

impl MatrixTransport<SerialStream> {
    /// Open a serial port at 8 data bits, 1 stop bit, no parity
    pub fn open(path: &str, baud_rate: u32, framing: Framing) -> Result<Self, tokio_serial::Error> {
        let stream = tokio_serial::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .open_native_async()?;

        Ok(Self::new(path.to_string(), stream, framing))
    }
}

impl<T> MatrixTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open stream
    pub fn new(name: String, io: T, framing: Framing) -> Self {
        Self {
            name,
            io,
            codec: FrameCodec::new(framing),
            buffer: vec![0u8; 1024],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write bytes to the device
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        trace!("{} <- {:?}", self.name, String::from_utf8_lossy(data));
        self.io.write_all(data).await?;
        self.io.flush().await
    }

    /// Next decoded message, or `None` once the stream has closed
    ///
    /// Cancel-safe: bytes read before cancellation stay buffered in the codec.
    pub async fn next_message(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(message) = self.codec.next_message() {
                trace!("{} -> {:?}", self.name, message);
                return Ok(Some(message));
            }

            let n = self.io.read(&mut self.buffer).await?;
            if n == 0 {
                return Ok(None);
            }
            self.codec.push_bytes(&self.buffer[..n]);
        }
    }
}
