use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::errors::QuoteFetchError;

/// Run-level deadline, checked before any new request is issued.
///
/// Requests already in flight are never aborted; their outcomes are still
/// recorded.
#[derive(Clone)]
pub struct RunDeadline {
    clock: Arc<dyn Clock>,
    at: Option<Instant>,
}

impl RunDeadline {
    /// A deadline `budget` from now, or none.
    pub fn new(clock: Arc<dyn Clock>, budget: Option<Duration>) -> Self {
        let at = budget.map(|b| clock.now() + b);
        Self { clock, at }
    }

    pub fn unbounded(clock: Arc<dyn Clock>) -> Self {
        Self { clock, at: None }
    }

    pub fn is_expired(&self) -> bool {
        match self.at {
            Some(at) => self.clock.now() >= at,
            None => false,
        }
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(self.clock.now()))
    }

    /// Shorten a wait so it never runs past the deadline.
    pub fn cap(&self, wait: Duration) -> Duration {
        match self.remaining() {
            Some(left) => wait.min(left),
            None => wait,
        }
    }

    /// `Err(Cancelled)` once expired.
    pub fn check(&self) -> Result<(), QuoteFetchError> {
        if self.is_expired() {
            Err(QuoteFetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}
