//! Trailing-edge debouncer driven by an injected clock
//!
//! Every `schedule` pushes the deadline out to `now + window`; the action
//! fires once, when a tick observes the deadline has passed.

use tokio::time::{sleep_until, Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Request the action, collapsing with any pending request
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel_pending(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once per burst, when the window has elapsed
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Sleep until `deadline`, or forever when there is none
pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(35));

        debouncer.schedule(start);
        debouncer.schedule(start + Duration::from_millis(10));
        debouncer.schedule(start + Duration::from_millis(20));

        assert!(!debouncer.fire_if_due(start + Duration::from_millis(40)));
        assert!(debouncer.fire_if_due(start + Duration::from_millis(55)));
        assert!(!debouncer.fire_if_due(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_separate_bursts_fire_separately() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(35));

        debouncer.schedule(start);
        assert!(debouncer.fire_if_due(start + Duration::from_millis(35)));

        debouncer.schedule(start + Duration::from_millis(100));
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(135))
        );
        assert!(debouncer.fire_if_due(start + Duration::from_millis(135)));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(250));
        debouncer.schedule(start);
        assert!(debouncer.is_pending());
        debouncer.cancel_pending();
        assert!(!debouncer.fire_if_due(start + Duration::from_secs(1)));
    }
}
