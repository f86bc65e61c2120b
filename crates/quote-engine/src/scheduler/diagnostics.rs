//! Per-chunk attempt tracking for run diagnostics.

use serde::{Deserialize, Serialize};

use super::ChunkState;

/// How one chunk attempt ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Rate-limit or auth-block signature.
    Blocked,
    /// Any other error that rotated the identity.
    Failed,
    Cancelled,
}

/// Record of a single attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAttempt {
    pub attempt: u32,
    /// Proxy address or "direct".
    pub identity: String,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything that happened to one chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub index: usize,
    pub symbols: usize,
    pub state: ChunkState,
    /// At least one attempt hit a block signature.
    pub rate_limited: bool,
    /// Switches to a different identity after a failure.
    pub rotations: usize,
    pub attempts: Vec<ChunkAttempt>,
}

impl ChunkReport {
    pub fn new(index: usize, symbols: usize) -> Self {
        Self {
            index,
            symbols,
            state: ChunkState::Pending,
            rate_limited: false,
            rotations: 0,
            attempts: Vec::new(),
        }
    }

    pub fn record_success(&mut self, attempt: u32, identity: String) {
        self.attempts.push(ChunkAttempt {
            attempt,
            identity,
            outcome: AttemptOutcome::Success,
            error: None,
        });
    }

    pub fn record_error(&mut self, attempt: u32, identity: String, blocked: bool, error: String) {
        if blocked {
            self.rate_limited = true;
        }
        self.attempts.push(ChunkAttempt {
            attempt,
            identity,
            outcome: if blocked {
                AttemptOutcome::Blocked
            } else {
                AttemptOutcome::Failed
            },
            error: Some(error),
        });
    }

    pub fn record_cancelled(&mut self, attempt: u32, identity: String) {
        self.attempts.push(ChunkAttempt {
            attempt,
            identity,
            outcome: AttemptOutcome::Cancelled,
            error: None,
        });
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, ChunkState::Exhausted { .. })
    }

    pub fn has_success(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::Success)
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        let trail = self
            .attempts
            .iter()
            .map(|a| match (&a.outcome, &a.error) {
                (AttemptOutcome::Success, _) => format!("{}: SUCCESS", a.identity),
                (AttemptOutcome::Cancelled, _) => format!("{}: CANCELLED", a.identity),
                (AttemptOutcome::Blocked, Some(e)) => format!("{}: BLOCKED ({})", a.identity, e),
                (_, Some(e)) => format!("{}: ERROR ({})", a.identity, e),
                (_, None) => format!("{}: UNKNOWN", a.identity),
            })
            .collect::<Vec<_>>()
            .join(" -> ");
        format!("chunk {} [{}]: {}", self.index, self.state, trail)
    }
}
