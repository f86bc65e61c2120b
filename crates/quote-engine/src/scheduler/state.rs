use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one chunk.
///
/// ```text
/// Pending ─► InFlight ─┬─► Complete
///                      └─► RetryQueued ─► InFlight ─► ... ─► Exhausted
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    InFlight { attempt: u32 },
    RetryQueued { attempts: u32 },
    Complete { attempts: u32 },
    Exhausted { attempts: u32 },
    /// The run deadline fired before the chunk finished.
    Cancelled { attempts: u32 },
}

/// What ended an in-flight attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttemptResult {
    Succeeded,
    /// Abandoned on a retryable error.
    Failed,
    Cancelled,
}

impl ChunkState {
    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        match *self {
            Self::Pending => 0,
            Self::InFlight { attempt } => attempt,
            Self::RetryQueued { attempts }
            | Self::Complete { attempts }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Exhausted { .. } | Self::Cancelled { .. }
        )
    }

    /// Start the next attempt. Only valid from `Pending` or `RetryQueued`.
    pub fn dispatch(self) -> Self {
        match self {
            Self::Pending => Self::InFlight { attempt: 1 },
            Self::RetryQueued { attempts } => Self::InFlight {
                attempt: attempts + 1,
            },
            other => other,
        }
    }

    /// Resolve an in-flight attempt, given the attempt budget.
    pub fn resolve(self, result: AttemptResult, max_attempts: u32) -> Self {
        let Self::InFlight { attempt } = self else {
            return self;
        };
        match result {
            AttemptResult::Succeeded => Self::Complete { attempts: attempt },
            AttemptResult::Cancelled => Self::Cancelled { attempts: attempt },
            AttemptResult::Failed if attempt >= max_attempts => Self::Exhausted { attempts: attempt },
            AttemptResult::Failed => Self::RetryQueued { attempts: attempt },
        }
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight { attempt } => write!(f, "in-flight (attempt {})", attempt),
            Self::RetryQueued { attempts } => write!(f, "retry-queued after {}", attempts),
            Self::Complete { attempts } => write!(f, "complete after {}", attempts),
            Self::Exhausted { attempts } => write!(f, "exhausted after {}", attempts),
            Self::Cancelled { attempts } => write!(f, "cancelled after {}", attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path() {
        let state = ChunkState::Pending.dispatch();
        assert_eq!(state, ChunkState::InFlight { attempt: 1 });
        let state = state.resolve(AttemptResult::Succeeded, 4);
        assert_eq!(state, ChunkState::Complete { attempts: 1 });
        assert!(state.is_terminal());
    }

    #[test]
    fn test_retry_until_exhausted() {
        let mut state = ChunkState::Pending;
        for _ in 0..3 {
            state = state.dispatch().resolve(AttemptResult::Failed, 4);
            assert!(matches!(state, ChunkState::RetryQueued { .. }));
        }
        state = state.dispatch().resolve(AttemptResult::Failed, 4);
        assert_eq!(state, ChunkState::Exhausted { attempts: 4 });
    }

    #[test]
    fn test_retry_then_success() {
        let state = ChunkState::Pending
            .dispatch()
            .resolve(AttemptResult::Failed, 4)
            .dispatch()
            .resolve(AttemptResult::Failed, 4)
            .dispatch()
            .resolve(AttemptResult::Succeeded, 4);
        assert_eq!(state, ChunkState::Complete { attempts: 3 });
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let state = ChunkState::Pending
            .dispatch()
            .resolve(AttemptResult::Cancelled, 4);
        assert_eq!(state, ChunkState::Cancelled { attempts: 1 });
        assert!(state.is_terminal());
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let done = ChunkState::Complete { attempts: 2 };
        assert_eq!(done.dispatch(), done);
        assert_eq!(ChunkState::Pending.resolve(AttemptResult::Succeeded, 4), ChunkState::Pending);
    }
}
