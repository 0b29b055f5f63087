//! Virtual matrix actor task
//!
//! Owns a [`VirtualMatrix`] and serves it over an async stream, standing in
//! for the serial cable. The host side of the stream can be handed straight
//! to a matrix driver.

use std::io;

use av_protocol::Protocol;
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::VirtualMatrix;

/// Size of the in-memory cable buffer
const CABLE_BUFFER: usize = 4096;

/// Commands that can be sent to a virtual matrix actor
#[derive(Debug, Clone)]
pub enum VirtualMatrixCommand {
    /// Stop (or resume) answering the host
    SetSilent(bool),
    /// Change a route from the front panel (0-based)
    FrontPanel { output: u8, input: u8 },
    /// Shutdown the virtual matrix actor
    Shutdown,
}

/// Run the virtual matrix actor task
///
/// Routing changes are published on `state_tx`. The task ends when the
/// stream closes or a shutdown is requested.
pub async fn run_virtual_matrix_task<S>(
    mut stream: S,
    mut matrix: VirtualMatrix,
    mut cmd_rx: mpsc::Receiver<VirtualMatrixCommand>,
    state_tx: watch::Sender<Vec<u8>>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    let name = matrix.protocol().name();
    info!("Starting virtual {} matrix", name);

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual {} matrix stream closed", name);
                        break;
                    }
                    Ok(n) => {
                        if matrix.process_bytes(&buf[..n]) {
                            state_tx.send_replace(matrix.outputs().to_vec());
                        }
                    }
                    Err(e) => {
                        warn!("Virtual {} matrix stream error: {}", name, e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualMatrixCommand::SetSilent(silent)) => {
                        info!("Virtual {} matrix silent: {}", name, silent);
                        matrix.set_silent(silent);
                    }
                    Some(VirtualMatrixCommand::FrontPanel { output, input }) => {
                        if matrix.front_panel(output, input) {
                            state_tx.send_replace(matrix.outputs().to_vec());
                        }
                    }
                    Some(VirtualMatrixCommand::Shutdown) | None => {
                        info!("Shutdown requested for virtual {} matrix", name);
                        break;
                    }
                }
            }
        }

        while let Some(reply) = matrix.take_output() {
            stream.write_all(&reply).await?;
        }
        stream.flush().await?;
    }

    info!("Virtual {} matrix task ended", name);
    Ok(())
}

/// Handle to a spawned virtual matrix
#[derive(Debug, Clone)]
pub struct SimulatedMatrix {
    protocol: Protocol,
    cmd_tx: mpsc::Sender<VirtualMatrixCommand>,
    state_rx: watch::Receiver<Vec<u8>>,
}

impl SimulatedMatrix {
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The simulated device's own routing
    pub fn outputs(&self) -> Vec<u8> {
        self.state_rx.borrow().clone()
    }

    /// Watch the simulated device's routing
    pub fn subscribe(&self) -> watch::Receiver<Vec<u8>> {
        self.state_rx.clone()
    }

    pub async fn set_silent(&self, silent: bool) {
        let _ = self.cmd_tx.send(VirtualMatrixCommand::SetSilent(silent)).await;
    }

    pub async fn front_panel(&self, output: u8, input: u8) {
        let _ = self
            .cmd_tx
            .send(VirtualMatrixCommand::FrontPanel { output, input })
            .await;
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(VirtualMatrixCommand::Shutdown).await;
    }
}

/// Spawn a virtual matrix and return the host end of its cable
///
/// The HDMI and Extron devices start with output `n` on input `n`; the SB
/// device starts with everything on input 0, as after a reset.
pub fn spawn_simulated(protocol: Protocol) -> (DuplexStream, SimulatedMatrix) {
    let matrix = match protocol {
        Protocol::Sb => VirtualMatrix::new(protocol),
        Protocol::Hdmi | Protocol::Extron => VirtualMatrix::with_identity(protocol),
    };
    spawn_matrix(matrix)
}

/// Spawn the given virtual matrix and return the host end of its cable
pub fn spawn_matrix(matrix: VirtualMatrix) -> (DuplexStream, SimulatedMatrix) {
    let protocol = matrix.protocol();
    let (host, device) = duplex(CABLE_BUFFER);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (state_tx, state_rx) = watch::channel(matrix.outputs().to_vec());

    tokio::spawn(async move {
        if let Err(e) = run_virtual_matrix_task(device, matrix, cmd_rx, state_tx).await {
            warn!("Virtual {} matrix stopped: {}", protocol.name(), e);
        }
    });

    let handle = SimulatedMatrix {
        protocol,
        cmd_tx,
        state_rx,
    };
    (host, handle)
}
