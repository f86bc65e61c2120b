//! Global dispatch spacing.
//!
//! Every chunk attempt reserves the next free slot; slots are at least
//! `min_interval` apart across all workers. The reservation happens under the
//! lock, the wait happens outside it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::clock::{Clock, Sleeper};

use super::RunDeadline;

pub struct DispatchThrottle {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl DispatchThrottle {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
            clock,
            sleeper,
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Instant>> {
        self.next_slot.lock().unwrap_or_else(|poisoned| {
            warn!("Dispatch throttle mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Reserve the next slot and return how long to wait for it.
    pub fn reserve(&self) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }
        let mut next_slot = self.lock_slot();
        let now = self.clock.now();
        let slot = match *next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next_slot = Some(slot + self.min_interval);
        slot - now
    }

    /// Wait for the next slot, never past the deadline.
    pub async fn acquire(&self, deadline: &RunDeadline) {
        let wait = deadline.cap(self.reserve());
        if !wait.is_zero() {
            debug!("Dispatch throttle: waiting {:?}", wait);
            self.sleeper.sleep(wait).await;
        }
    }
}
