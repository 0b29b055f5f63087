//! Protocol probing
//!
//! A probe writes a protocol's identification request to a stream and waits
//! a bounded time for a framed message the protocol recognizes.

use std::time::Duration;

use av_protocol::{FrameCodec, MatrixProtocol};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Configuration for probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// How long to wait for a matching response
    pub timeout: Duration,
    /// Pause after opening a port before writing to it
    pub settle_delay: Duration,
    /// Open the port at this rate instead of the protocol's default
    pub baud_rate: Option<u32>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            settle_delay: Duration::from_millis(50),
            baud_rate: None,
        }
    }
}

impl ProbeConfig {
    pub fn with_baud_rate(mut self, baud_rate: Option<u32>) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// The rate a probe of `protocol` opens the port at
    pub fn baud_rate_for(&self, protocol: &dyn MatrixProtocol) -> u32 {
        self.baud_rate.unwrap_or_else(|| protocol.baud_rate())
    }
}

/// Probe an already-open stream for a device speaking `protocol`
///
/// Returns `true` as soon as a recognized response arrives, `false` on
/// timeout, write failure or end of stream.
pub async fn probe_stream<S>(
    stream: &mut S,
    protocol: &dyn MatrixProtocol,
    wait: Duration,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(request) = protocol.probe_request() else {
        debug!("{} has no probe request", protocol.protocol().name());
        return false;
    };

    trace!("Sending {} probe: {:?}", protocol.protocol().name(), String::from_utf8_lossy(&request));
    if let Err(e) = stream.write_all(&request).await {
        warn!("Failed to write {} probe: {}", protocol.protocol().name(), e);
        return false;
    }

    let mut codec = FrameCodec::new(protocol.framing());
    let exchange = async {
        let mut buf = [0u8; 256];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => return false,
                Ok(n) => {
                    codec.push_bytes(&buf[..n]);
                    while let Some(message) = codec.next_message() {
                        trace!("Probe response: {:?}", message);
                        if protocol.is_probe_response(&message) {
                            return true;
                        }
                    }
                }
                Err(e) => {
                    trace!("Probe read error: {}", e);
                    return false;
                }
            }
        }
    };

    match timeout(wait, exchange).await {
        Ok(found) => found,
        Err(_) => {
            trace!("{} probe timeout", protocol.protocol().name());
            false
        }
    }
}

/// Open `port_name`, probe it for `protocol`, and close it again
///
/// The port is dropped before returning on every path.
pub async fn probe_port(port_name: &str, protocol: &dyn MatrixProtocol) -> bool {
    probe_port_with_config(port_name, protocol, &ProbeConfig::default()).await
}

/// [`probe_port`] with explicit timing and baud rate
pub async fn probe_port_with_config(
    port_name: &str,
    protocol: &dyn MatrixProtocol,
    config: &ProbeConfig,
) -> bool {
    use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};

    let baud_rate = config.baud_rate_for(protocol);
    debug!(
        "Probing {} for {} at {} baud",
        port_name,
        protocol.protocol().name(),
        baud_rate
    );

    let mut stream = match tokio_serial::new(port_name, baud_rate)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .open_native_async()
    {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to open {}: {}", port_name, e);
            return false;
        }
    };

    // Give the port a moment to settle
    tokio::time::sleep(config.settle_delay).await;

    let found = probe_stream(&mut stream, protocol, config.timeout).await;
    drop(stream);

    if found {
        info!("{} answered as the {} matrix", port_name, protocol.protocol().name());
    }
    found
}
