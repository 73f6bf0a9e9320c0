use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Trailing-edge debouncer owning at most one pending deadline.
///
/// Each `trigger` pushes the deadline out to `now + delay`; `fired` resolves
/// once a deadline passes without another trigger, then disarms.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Waits for the pending deadline. Never resolves while disarmed, so it
    /// can sit in a `select!` next to other sources.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
