//! Command queue and retry engine
//!
//! One command is in flight at a time. Dispatching a command starts an ack
//! timer; the next message from the device counts as its ack. A timed-out
//! command waits out a backoff and is resent, up to a fixed number of
//! attempts, after which it is dropped and its ticket rejected.
//!
//! The queue never sleeps or does I/O itself. The driver calls
//! [`CommandQueue::next_dispatch`] to obtain bytes to write and
//! [`CommandQueue::on_timeout`] when [`CommandQueue::deadline`] passes.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// Why a command did not complete
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No ack after every attempt
    #[error("no acknowledgment after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The driver went away before the command completed
    #[error("matrix driver stopped")]
    DriverStopped,

    /// Output or input index is outside the matrix
    #[error("output {output} / input {input} is outside the matrix")]
    InvalidRoute { output: u8, input: u8 },
}

/// Sending half of a command's completion
pub type Completion = oneshot::Sender<Result<(), CommandError>>;

/// Completion ticket for an enqueued command
///
/// Dropping the ticket is fine; the command still runs.
#[derive(Debug)]
pub struct CommandTicket(oneshot::Receiver<Result<(), CommandError>>);

impl CommandTicket {
    /// A fresh ticket and the sender that resolves it
    pub fn new() -> (Completion, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// A ticket that is already resolved
    pub fn ready(result: Result<(), CommandError>) -> Self {
        let (tx, ticket) = Self::new();
        let _ = tx.send(result);
        ticket
    }

    /// Wait for the command to be acknowledged or dropped
    pub async fn wait(self) -> Result<(), CommandError> {
        self.0.await.unwrap_or(Err(CommandError::DriverStopped))
    }
}

/// Timing for the retry engine
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long to wait for an ack after each write
    pub ack_timeout: Duration,
    /// Total attempts per command, including the first
    pub max_attempts: u32,
    /// Pause between a timeout and the next attempt
    pub retry_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(1500),
            max_attempts: 5,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Outbound bytes plus an optional completion
#[derive(Debug)]
pub struct Command {
    bytes: Vec<u8>,
    completion: Option<Completion>,
}

impl Command {
    /// A command nobody waits on
    pub fn detached(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            completion: None,
        }
    }

    /// A command resolved through `completion`
    pub fn with_completion(bytes: Vec<u8>, completion: Completion) -> Self {
        Self {
            bytes,
            completion: Some(completion),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn finish(self, result: Result<(), CommandError>) {
        if let Some(completion) = self.completion {
            let _ = completion.send(result);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingAck { deadline: Instant },
    Backoff { until: Instant },
}

#[derive(Debug)]
struct InFlight {
    command: Command,
    attempt: u32,
    phase: Phase,
}

/// What happened when the ack timer expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// The command will be resent after the backoff
    Retrying { attempt: u32 },
    /// The command was dropped
    Dropped { attempts: u32 },
}

/// FIFO of commands with at most one in flight
#[derive(Debug)]
pub struct CommandQueue {
    config: QueueConfig,
    pending: VecDeque<Command>,
    in_flight: Option<InFlight>,
}

impl CommandQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            in_flight: None,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append a command; never blocks
    pub fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Append bytes and hand back a ticket for them
    pub fn enqueue_bytes(&mut self, bytes: Vec<u8>) -> CommandTicket {
        let (completion, ticket) = CommandTicket::new();
        self.enqueue(Command::with_completion(bytes, completion));
        ticket
    }

    /// Commands waiting behind the one in flight
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether a command is awaiting its ack or waiting to be retried
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether the in-flight command is currently waiting for an ack
    pub fn is_awaiting_ack(&self) -> bool {
        matches!(
            self.in_flight,
            Some(InFlight {
                phase: Phase::AwaitingAck { .. },
                ..
            })
        )
    }

    /// Bytes to write now, if any
    ///
    /// Starts the next pending command when idle, or resends the in-flight
    /// command once its backoff has elapsed.
    pub fn next_dispatch(&mut self, now: Instant) -> Option<Vec<u8>> {
        let ack_timeout = self.config.ack_timeout;

        if let Some(in_flight) = self.in_flight.as_mut() {
            return match in_flight.phase {
                Phase::Backoff { until } if now >= until => {
                    in_flight.attempt += 1;
                    in_flight.phase = Phase::AwaitingAck {
                        deadline: now + ack_timeout,
                    };
                    debug!(
                        "Resending command (attempt {}/{})",
                        in_flight.attempt, self.config.max_attempts
                    );
                    Some(in_flight.command.bytes.clone())
                }
                _ => None,
            };
        }

        let command = self.pending.pop_front()?;
        let bytes = command.bytes.clone();
        self.in_flight = Some(InFlight {
            command,
            attempt: 1,
            phase: Phase::AwaitingAck {
                deadline: now + ack_timeout,
            },
        });
        Some(bytes)
    }

    /// Treat an incoming message as the ack for the in-flight command
    ///
    /// A message arriving during the backoff after a timeout also counts.
    /// Returns `false` when nothing was in flight.
    pub fn acknowledge(&mut self) -> bool {
        match self.in_flight.take() {
            Some(in_flight) => {
                debug!("Command acknowledged on attempt {}", in_flight.attempt);
                in_flight.command.finish(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Handle an expired ack timer
    pub fn on_timeout(&mut self, now: Instant) -> Option<TimeoutOutcome> {
        let in_flight = self.in_flight.as_mut()?;
        let Phase::AwaitingAck { deadline } = in_flight.phase else {
            return None;
        };
        if now < deadline {
            return None;
        }

        let attempt = in_flight.attempt;
        if attempt >= self.config.max_attempts {
            warn!(
                "Command {:?} dropped after {} attempts",
                String::from_utf8_lossy(&in_flight.command.bytes),
                attempt
            );
            if let Some(in_flight) = self.in_flight.take() {
                in_flight
                    .command
                    .finish(Err(CommandError::RetriesExhausted { attempts: attempt }));
            }
            return Some(TimeoutOutcome::Dropped { attempts: attempt });
        }

        warn!(
            "No ack for {:?} (attempt {}/{})",
            String::from_utf8_lossy(&in_flight.command.bytes),
            attempt,
            self.config.max_attempts
        );
        in_flight.phase = Phase::Backoff {
            until: now + self.config.retry_backoff,
        };
        Some(TimeoutOutcome::Retrying {
            attempt: attempt + 1,
        })
    }

    /// When the queue next needs attention
    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|in_flight| match in_flight.phase {
            Phase::AwaitingAck { deadline } => deadline,
            Phase::Backoff { until } => until,
        })
    }

    /// Reject everything, in flight and pending
    pub fn shutdown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.command.finish(Err(CommandError::DriverStopped));
        }
        for command in self.pending.drain(..) {
            command.finish(Err(CommandError::DriverStopped));
        }
    }
}
