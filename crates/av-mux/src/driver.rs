//! Matrix driver
//!
//! A driver owns one transport, one command queue and the physical state of
//! one matrix. It is split in two:
//!
//! - [`DriverCore`] is a synchronous state machine. It consumes incoming
//!   messages, timer ticks and set-output requests, and produces
//!   [`DriverAction`]s. It never does I/O.
//! - [`run_driver`] is the actor task that feeds the core from the
//!   transport, the command channel and a single timer, then carries out the
//!   actions it produced.
//!
//! External code talks to a running driver through a [`MatrixHandle`].
//!
//! # Example
//!
//! ```rust,no_run
//! use av_mux::{DriverId, MatrixDriver};
//! use av_protocol::Protocol;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), av_mux::MuxError> {
//! let (event_tx, _event_rx) = mpsc::channel(256);
//! let driver = MatrixDriver::new(DriverId::Hdmi, Protocol::Hdmi, event_tx);
//!
//! if driver.test_com("/dev/ttyUSB0").await {
//!     let hdmi = driver.init("/dev/ttyUSB0")?;
//!     hdmi.set_output(Some(4), 6);
//! }
//! # Ok(())
//! # }
//! ```

use av_detect::ProbeConfig;
use av_protocol::{create_protocol, Incoming, MatrixProtocol, ParseError, Protocol};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::debounce::{sleep_until_deadline, Debouncer};
use crate::error::MuxError;
use crate::events::MatrixEvent;
use crate::queue::{
    Command, CommandError, CommandQueue, CommandTicket, Completion, QueueConfig, TimeoutOutcome,
};
use crate::state::{DriverId, DriverStatus, MatrixState};
use crate::transport::MatrixTransport;

/// Window in which full-update triggers collapse into one request
pub const FULL_UPDATE_DEBOUNCE: Duration = Duration::from_millis(35);

/// Side effects requested by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverAction {
    /// Write these bytes to the device
    Write(Vec<u8>),
    /// The physical state changed to this vector
    StateChanged(Vec<u8>),
    /// The driver moved to a new status
    Status(DriverStatus),
    /// A command was dropped after its last attempt
    CommandFailed { attempts: u32 },
}

/// Synchronous driver state machine
pub struct DriverCore {
    id: DriverId,
    protocol: Box<dyn MatrixProtocol>,
    state: MatrixState,
    queue: CommandQueue,
    full_update: Debouncer,
    status: DriverStatus,
    actions: Vec<DriverAction>,
}

impl DriverCore {
    pub fn new(id: DriverId, protocol: Box<dyn MatrixProtocol>, config: QueueConfig) -> Self {
        let state = MatrixState::identity(protocol.num_outputs(), protocol.num_inputs());
        Self {
            id,
            protocol,
            state,
            queue: CommandQueue::new(config),
            full_update: Debouncer::new(FULL_UPDATE_DEBOUNCE),
            status: DriverStatus::Disconnected,
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> DriverId {
        self.id
    }

    pub fn protocol(&self) -> &dyn MatrixProtocol {
        self.protocol.as_ref()
    }

    pub fn state(&self) -> &[u8] {
        self.state.outputs()
    }

    pub fn status(&self) -> DriverStatus {
        self.status
    }

    /// Drain the actions produced since the last call
    pub fn take_actions(&mut self) -> Vec<DriverAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn on_connecting(&mut self) {
        self.set_status(DriverStatus::Connecting);
    }

    /// The channel is open: identity state, bring-up commands, then a
    /// debounced full-update request
    pub fn on_open(&mut self, now: Instant) {
        self.state.reset_identity();
        self.set_status(DriverStatus::Idle);

        for command in self.protocol.bring_up_commands() {
            self.queue.enqueue(Command::detached(command));
        }
        self.request_full_update(now);
        self.pump(now);
    }

    /// The channel is gone; nothing in the queue will ever be acknowledged
    pub fn on_closed(&mut self) {
        self.queue.shutdown();
        self.full_update.cancel_pending();
        self.set_status(DriverStatus::Disconnected);
    }

    /// Queue "route `input` to `output`"; a `None` output is a no-op
    pub fn set_output(
        &mut self,
        output: Option<u8>,
        input: u8,
        completion: Completion,
        now: Instant,
    ) {
        let Some(output) = output else {
            trace!("{} matrix: no output for input {}, skipping", self.id, input);
            let _ = completion.send(Ok(()));
            return;
        };

        if usize::from(output) >= self.state.num_outputs()
            || usize::from(input) >= self.state.num_inputs()
        {
            warn!(
                "{} matrix: rejecting out-of-range route {} -> {}",
                self.id, input, output
            );
            let _ = completion.send(Err(CommandError::InvalidRoute { output, input }));
            return;
        }

        debug!("{} matrix: queue output {} <- input {}", self.id, output, input);
        let bytes = self.protocol.encode_set_output(output, input);
        self.queue.enqueue(Command::with_completion(bytes, completion));
        self.pump(now);
    }

    /// Ask for a full update, collapsing with any request in the window
    ///
    /// Devices without a full-update request ignore this.
    pub fn request_full_update(&mut self, now: Instant) {
        if self.protocol.full_update_request().is_some() {
            self.full_update.schedule(now);
        }
    }

    /// Parse a full-update payload and adopt it
    ///
    /// A malformed payload leaves the previous state in place.
    pub fn process_full_update(&mut self, raw: &str) -> Vec<u8> {
        if let Err(e) = self.apply_full_update(raw) {
            warn!("{} matrix: ignoring malformed full update: {}", self.id, e);
        }
        self.state.outputs().to_vec()
    }

    fn apply_full_update(&mut self, raw: &str) -> Result<(), ParseError> {
        let outputs = self.protocol.parse_full_update(raw)?;
        let found = outputs.len();
        if self.state.replace(outputs) {
            Ok(())
        } else {
            Err(ParseError::FieldCount {
                expected: self.state.num_outputs(),
                found,
            })
        }
    }

    /// Dispatch one framed message from the device
    pub fn handle_message(&mut self, message: &str, now: Instant) {
        if self.queue.acknowledge() {
            debug!("{} matrix: ack {:?}", self.id, message);
        }

        match self.protocol.classify(message) {
            Incoming::FullUpdate => match self.apply_full_update(message) {
                Ok(()) => {
                    debug!("{} matrix: full update {:?}", self.id, self.state.outputs());
                    self.emit_state();
                }
                Err(e) => warn!("{} matrix: ignoring malformed full update: {}", self.id, e),
            },
            Incoming::OutputAck { output, input } => {
                if self.state.set_output(output, input) {
                    self.emit_state();
                } else {
                    warn!(
                        "{} matrix: ack for unknown output {} / input {}",
                        self.id, output, input
                    );
                }
            }
            Incoming::Reset => {
                info!("{} matrix: reset acknowledged", self.id);
                self.state.reset();
                self.emit_state();
            }
            Incoming::Trigger => self.request_full_update(now),
            Incoming::Other => trace!("{} matrix: ignoring {:?}", self.id, message),
        }

        self.pump(now);
    }

    /// Handle timers that have come due
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(TimeoutOutcome::Dropped { attempts }) = self.queue.on_timeout(now) {
            self.actions.push(DriverAction::CommandFailed { attempts });
        }

        if self.full_update.fire_if_due(now) {
            if let Some(request) = self.protocol.full_update_request() {
                debug!("{} matrix: requesting full update", self.id);
                self.queue.enqueue(Command::detached(request));
            }
        }

        self.pump(now);
    }

    /// Earliest instant at which [`on_tick`](Self::on_tick) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.queue.deadline(), self.full_update.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn pump(&mut self, now: Instant) {
        if !self.status.is_connected() {
            return;
        }
        if let Some(bytes) = self.queue.next_dispatch(now) {
            self.actions.push(DriverAction::Write(bytes));
        }
        let status = if self.queue.is_busy() {
            DriverStatus::AwaitingAck
        } else {
            DriverStatus::Idle
        };
        self.set_status(status);
    }

    fn emit_state(&mut self) {
        self.actions
            .push(DriverAction::StateChanged(self.state.outputs().to_vec()));
    }

    fn set_status(&mut self, status: DriverStatus) {
        if self.status != status {
            trace!("{} matrix: {:?} -> {:?}", self.id, self.status, status);
            self.status = status;
            self.actions.push(DriverAction::Status(status));
        }
    }
}

/// Commands sent to a running driver
#[derive(Debug)]
pub enum DriverCommand {
    /// Route `input` to `output`; `None` is a no-op
    SetOutput {
        output: Option<u8>,
        input: u8,
        completion: Completion,
    },
    /// Debounced full-update request
    RequestFullUpdate,
    /// Stop the driver
    Shutdown,
}

/// Point-in-time view of a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixSnapshot {
    pub status: DriverStatus,
    pub outputs: Vec<u8>,
}

/// Driver actor loop
///
/// Runs until the channel closes, a read fails, or every handle is dropped.
/// There is no reconnect.
pub async fn run_driver<T>(
    mut core: DriverCore,
    mut transport: MatrixTransport<T>,
    mut cmd_rx: mpsc::UnboundedReceiver<DriverCommand>,
    event_tx: mpsc::Sender<MatrixEvent>,
    state_tx: watch::Sender<MatrixSnapshot>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let id = core.id();
    info!("Starting {} matrix driver on {}", id, transport.name());

    core.on_open(Instant::now());
    carry_out(&mut core, Some(&mut transport), &event_tx, &state_tx).await;

    loop {
        let wakeup = core.next_deadline();

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(DriverCommand::SetOutput { output, input, completion }) => {
                        core.set_output(output, input, completion, Instant::now());
                    }
                    Some(DriverCommand::RequestFullUpdate) => {
                        core.request_full_update(Instant::now());
                    }
                    Some(DriverCommand::Shutdown) | None => {
                        info!("Shutdown requested for {} matrix", id);
                        break;
                    }
                }
            }

            message = transport.next_message() => {
                match message {
                    Ok(Some(message)) => core.handle_message(&message, Instant::now()),
                    Ok(None) => {
                        info!("{} matrix channel closed", id);
                        break;
                    }
                    Err(e) => {
                        warn!("Read error on {} matrix: {}", id, e);
                        let _ = event_tx.send(MatrixEvent::TransportError {
                            driver: id,
                            message: format!("read error: {}", e),
                        }).await;
                        break;
                    }
                }
            }

            _ = sleep_until_deadline(wakeup) => core.on_tick(Instant::now()),
        }

        carry_out(&mut core, Some(&mut transport), &event_tx, &state_tx).await;
    }

    core.on_closed();
    carry_out::<T>(&mut core, None, &event_tx, &state_tx).await;
    info!("{} matrix driver stopped", id);
}

async fn carry_out<T>(
    core: &mut DriverCore,
    mut transport: Option<&mut MatrixTransport<T>>,
    event_tx: &mpsc::Sender<MatrixEvent>,
    state_tx: &watch::Sender<MatrixSnapshot>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let driver = core.id();

    for action in core.take_actions() {
        match action {
            DriverAction::Write(bytes) => {
                let Some(transport) = transport.as_deref_mut() else {
                    continue;
                };
                if let Err(e) = transport.write(&bytes).await {
                    warn!("Write error on {} matrix: {}", driver, e);
                    let _ = event_tx
                        .send(MatrixEvent::TransportError {
                            driver,
                            message: format!("write error: {}", e),
                        })
                        .await;
                }
            }
            DriverAction::StateChanged(outputs) => {
                state_tx.send_modify(|snapshot| snapshot.outputs.clone_from(&outputs));
                let _ = event_tx
                    .send(MatrixEvent::StateChanged { driver, outputs })
                    .await;
            }
            DriverAction::Status(status) => {
                state_tx.send_modify(|snapshot| snapshot.status = status);
                let _ = event_tx
                    .send(MatrixEvent::StatusChanged { driver, status })
                    .await;
            }
            DriverAction::CommandFailed { attempts } => {
                let _ = event_tx
                    .send(MatrixEvent::CommandFailed { driver, attempts })
                    .await;
            }
        }
    }
}

/// Stand-in loop when hardware is disabled: every command succeeds at once
async fn run_offline(id: DriverId, mut cmd_rx: mpsc::UnboundedReceiver<DriverCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            DriverCommand::SetOutput {
                output,
                input,
                completion,
            } => {
                debug!(
                    "{} matrix offline, skipping output {:?} <- input {}",
                    id, output, input
                );
                let _ = completion.send(Ok(()));
            }
            DriverCommand::RequestFullUpdate => {}
            DriverCommand::Shutdown => break,
        }
    }
}

/// Operations the router needs from a matrix
pub trait MatrixControl: Send + Sync {
    /// Queue "route `input` to `output`"; a `None` output is a no-op
    fn set_output(&self, output: Option<u8>, input: u8) -> CommandTicket;

    /// Current physical state
    fn outputs(&self) -> Vec<u8>;
}

/// Handle to a running driver
#[derive(Debug, Clone)]
pub struct MatrixHandle {
    id: DriverId,
    cmd_tx: mpsc::UnboundedSender<DriverCommand>,
    state_rx: watch::Receiver<MatrixSnapshot>,
}

impl MatrixHandle {
    pub fn id(&self) -> DriverId {
        self.id
    }

    /// Queue a route; never blocks. The ticket may be ignored.
    pub fn set_output(&self, output: Option<u8>, input: u8) -> CommandTicket {
        let (completion, ticket) = CommandTicket::new();
        let cmd = DriverCommand::SetOutput {
            output,
            input,
            completion,
        };
        if self.cmd_tx.send(cmd).is_err() {
            debug!("{} matrix driver is not running", self.id);
        }
        ticket
    }

    pub fn request_full_update(&self) {
        let _ = self.cmd_tx.send(DriverCommand::RequestFullUpdate);
    }

    pub fn outputs(&self) -> Vec<u8> {
        self.state_rx.borrow().outputs.clone()
    }

    pub fn status(&self) -> DriverStatus {
        self.state_rx.borrow().status
    }

    pub fn snapshot(&self) -> MatrixSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Watch the driver's status and state
    pub fn subscribe(&self) -> watch::Receiver<MatrixSnapshot> {
        self.state_rx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(DriverCommand::Shutdown);
    }
}

impl MatrixControl for MatrixHandle {
    fn set_output(&self, output: Option<u8>, input: u8) -> CommandTicket {
        MatrixHandle::set_output(self, output, input)
    }

    fn outputs(&self) -> Vec<u8> {
        MatrixHandle::outputs(self)
    }
}

/// An unstarted matrix driver
///
/// Starting it consumes the value, so a driver can only be started once.
pub struct MatrixDriver {
    id: DriverId,
    protocol: Protocol,
    queue_config: QueueConfig,
    baud_rate: Option<u32>,
    event_tx: mpsc::Sender<MatrixEvent>,
}

impl MatrixDriver {
    pub fn new(id: DriverId, protocol: Protocol, event_tx: mpsc::Sender<MatrixEvent>) -> Self {
        Self {
            id,
            protocol,
            queue_config: QueueConfig::default(),
            baud_rate: None,
            event_tx,
        }
    }

    /// Override ack timeout, attempts and backoff
    pub fn with_queue_config(mut self, config: QueueConfig) -> Self {
        self.queue_config = config;
        self
    }

    /// Open the port at `baud_rate` instead of the protocol's default
    pub fn with_baud_rate(mut self, baud_rate: Option<u32>) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn id(&self) -> DriverId {
        self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Probe settings matching what `init` will open the port with
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig::default().with_baud_rate(self.baud_rate)
    }

    /// Probe `path` for this driver's device; the port is always closed again
    pub async fn test_com(&self, path: &str) -> bool {
        let protocol = create_protocol(self.protocol);
        av_detect::probe_port_with_config(path, protocol.as_ref(), &self.probe_config()).await
    }

    /// Open the serial port at `path` and start the driver task
    pub fn init(self, path: &str) -> Result<MatrixHandle, MuxError> {
        let protocol = create_protocol(self.protocol);
        let baud_rate = self.baud_rate.unwrap_or_else(|| protocol.baud_rate());
        info!(
            "Opening {} matrix ({}) on {} at {} baud",
            self.id,
            self.protocol.name(),
            path,
            baud_rate
        );

        let transport = MatrixTransport::open(path, baud_rate, protocol.framing())
            .map_err(|source| MuxError::OpenFailed {
                driver: self.id,
                path: path.to_string(),
                source,
            })?;

        Ok(self.spawn(protocol, transport))
    }

    /// Start the driver task over an already-open stream
    pub fn init_with_io<T>(self, name: &str, io: T) -> MatrixHandle
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let protocol = create_protocol(self.protocol);
        let transport = MatrixTransport::new(name.to_string(), io, protocol.framing());
        self.spawn(protocol, transport)
    }

    /// Start without hardware: identity state, commands accepted and dropped
    pub fn init_offline(self) -> MatrixHandle {
        let protocol = create_protocol(self.protocol);
        let state = MatrixState::identity(protocol.num_outputs(), protocol.num_inputs());
        info!("{} matrix running offline", self.id);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(MatrixSnapshot {
            status: DriverStatus::Disconnected,
            outputs: state.outputs().to_vec(),
        });
        tokio::spawn(run_offline(self.id, cmd_rx));

        MatrixHandle {
            id: self.id,
            cmd_tx,
            state_rx,
        }
    }

    fn spawn<T>(
        self,
        protocol: Box<dyn MatrixProtocol>,
        transport: MatrixTransport<T>,
    ) -> MatrixHandle
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut core = DriverCore::new(self.id, protocol, self.queue_config);
        core.on_connecting();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(MatrixSnapshot {
            status: core.status(),
            outputs: core.state().to_vec(),
        });

        tokio::spawn(run_driver(core, transport, cmd_rx, self.event_tx, state_tx));

        MatrixHandle {
            id: self.id,
            cmd_tx,
            state_rx,
        }
    }
}
