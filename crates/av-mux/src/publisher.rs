//! Virtual state publisher
//!
//! Keeps the latest physical state reported by each driver and, 250 ms after
//! the last change in a burst, recomputes the virtual route vector and pushes
//! it to every subscriber.

use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::debounce::{sleep_until_deadline, Debouncer};
use crate::events::MatrixEvent;
use crate::routing::{compute_virtual_state, VirtualInput};
use crate::state::DriverId;

/// Quiet period before a recompute
pub const PUBLISH_DEBOUNCE: Duration = Duration::from_millis(250);

/// One entry per virtual output; `None` is the null route
pub type VirtualState = Vec<Option<VirtualInput>>;

/// Publisher task state
pub struct StatePublisher {
    hdmi: Vec<u8>,
    component: Vec<u8>,
    debouncer: Debouncer,
    state_tx: watch::Sender<VirtualState>,
}

impl StatePublisher {
    /// Start from the drivers' current states and publish them immediately
    pub fn new(hdmi: Vec<u8>, component: Vec<u8>) -> (Self, watch::Receiver<VirtualState>) {
        let initial = compute_virtual_state(&hdmi, &component);
        let (state_tx, state_rx) = watch::channel(initial);
        let publisher = Self {
            hdmi,
            component,
            debouncer: Debouncer::new(PUBLISH_DEBOUNCE),
            state_tx,
        };
        (publisher, state_rx)
    }

    /// Record an event; state changes start (or extend) the debounce window
    pub fn observe(&mut self, event: MatrixEvent, now: Instant) {
        match event {
            MatrixEvent::StateChanged { driver, outputs } => {
                debug!("{} matrix state {:?}", driver, outputs);
                match driver {
                    DriverId::Hdmi => self.hdmi = outputs,
                    DriverId::Component => self.component = outputs,
                }
                self.debouncer.schedule(now);
            }
            MatrixEvent::StatusChanged { driver, status } => {
                info!("{} matrix is {:?}", driver, status);
            }
            MatrixEvent::CommandFailed { driver, attempts } => {
                warn!("{} matrix dropped a command after {} attempts", driver, attempts);
            }
            MatrixEvent::TransportError { driver, message } => {
                warn!("{} matrix transport error: {}", driver, message);
            }
        }
    }

    /// Publish if the debounce window has elapsed
    pub fn tick(&mut self, now: Instant) {
        if self.debouncer.fire_if_due(now) {
            self.publish();
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    fn publish(&self) {
        let state = compute_virtual_state(&self.hdmi, &self.component);
        info!("Virtual outputs: {:?}", state);
        self.state_tx.send_replace(state);
    }

    /// Run until the event channel closes
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<MatrixEvent>) {
        loop {
            let wakeup = self.deadline();

            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => self.observe(event, Instant::now()),
                        None => break,
                    }
                }
                _ = sleep_until_deadline(wakeup) => self.tick(Instant::now()),
            }
        }

        if self.debouncer.is_pending() {
            self.publish();
        }
        debug!("State publisher stopped");
    }
}
