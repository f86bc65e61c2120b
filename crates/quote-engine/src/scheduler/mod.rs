//! Chunk scheduling and concurrency control.
//!
//! Chunks are fanned out with at most `concurrency_limit()` in flight. Each
//! attempt leases an identity from the proxy registry (or goes direct), builds
//! a fresh session, and runs the tiered pipeline. A rate-limit or auth-block
//! signature fails the attempt: the identity is penalized and excluded, and
//! the chunk is retried on another identity after a jittered backoff, up to
//! the attempt budget. A pass where every upstream call failed transiently
//! (a dead proxy, timeouts) fails the attempt the same way.

mod deadline;
mod diagnostics;
mod policy;
mod state;
mod throttle;

pub use deadline::RunDeadline;
pub use diagnostics::{AttemptOutcome, ChunkAttempt, ChunkReport};
pub use policy::BackoffPolicy;
pub use state::{AttemptResult, ChunkState};
pub use throttle::DispatchThrottle;

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::clock::Sleeper;
use crate::errors::QuoteFetchError;
use crate::models::{identity_label, Chunk, ProxyAddr};
use crate::pipeline::{QuoteBook, TierReport, TieredFetchPipeline};
use crate::proxy::ProxyHealthRegistry;
use crate::session::SessionFactory;

/// Drives every chunk to a terminal state.
pub struct ChunkScheduler {
    pipeline: Arc<TieredFetchPipeline>,
    sessions: Arc<SessionFactory>,
    registry: Option<Arc<ProxyHealthRegistry>>,
    policy: BackoffPolicy,
    throttle: Arc<DispatchThrottle>,
    sleeper: Arc<dyn Sleeper>,
    workers: usize,
}

impl ChunkScheduler {
    pub fn new(
        pipeline: Arc<TieredFetchPipeline>,
        sessions: Arc<SessionFactory>,
        registry: Option<Arc<ProxyHealthRegistry>>,
        policy: BackoffPolicy,
        throttle: Arc<DispatchThrottle>,
        sleeper: Arc<dyn Sleeper>,
        workers: usize,
    ) -> Self {
        Self {
            pipeline,
            sessions,
            registry,
            policy,
            throttle,
            sleeper,
            workers,
        }
    }

    /// Chunks allowed in flight: the worker cap, further bounded by the pool
    /// size when proxying.
    pub fn concurrency_limit(&self) -> usize {
        let workers = self.workers.max(1);
        match &self.registry {
            Some(registry) if !registry.is_empty() => workers.min(registry.len()),
            _ => workers,
        }
    }

    /// Run every chunk. Reports come back ordered by chunk index.
    pub async fn run(
        &self,
        chunks: Vec<Chunk>,
        book: &QuoteBook,
        deadline: &RunDeadline,
    ) -> Vec<ChunkReport> {
        let limit = self.concurrency_limit();
        info!(
            "Scheduling {} chunks with concurrency {} ({})",
            chunks.len(),
            limit,
            if self.registry.is_some() {
                "proxied"
            } else {
                "direct"
            }
        );

        let mut reports: Vec<ChunkReport> = stream::iter(chunks)
            .map(|chunk| self.process_chunk(chunk, book, deadline))
            .buffer_unordered(limit)
            .collect()
            .await;

        reports.sort_by_key(|r| r.index);
        reports
    }

    fn select_identity(&self, excluded: &mut HashSet<ProxyAddr>) -> Option<ProxyAddr> {
        let registry = self.registry.as_ref()?;
        if excluded.len() >= registry.len() {
            // Every identity failed this chunk once; fall back to health scores alone
            excluded.clear();
        }
        registry.select(excluded)
    }

    async fn process_chunk(
        &self,
        chunk: Chunk,
        book: &QuoteBook,
        deadline: &RunDeadline,
    ) -> ChunkReport {
        let mut report = ChunkReport::new(chunk.index, chunk.len());
        let mut state = ChunkState::Pending;
        let mut excluded: HashSet<ProxyAddr> = HashSet::new();
        let mut last_failed: Option<ProxyAddr> = None;

        while !state.is_terminal() {
            self.throttle.acquire(deadline).await;
            if deadline.is_expired() {
                state = ChunkState::Cancelled {
                    attempts: state.attempts(),
                };
                break;
            }

            state = state.dispatch();
            let attempt = state.attempts();

            let identity = self.select_identity(&mut excluded);
            if let (Some(prev), Some(current)) = (&last_failed, &identity) {
                if prev != current {
                    report.rotations += 1;
                    debug!(
                        "Chunk {} rotating {} -> {}",
                        chunk.index, prev, current
                    );
                }
            }
            let label = identity_label(identity.as_ref());

            let result = self
                .attempt(identity.clone(), &chunk, book, deadline)
                .await;

            match result {
                Ok(tiers) => {
                    // Requests that were answered before a deadline still count
                    if let (Some(registry), Some(id), Some(latency)) =
                        (&self.registry, &identity, tiers.response_time)
                    {
                        registry.record_success(id, latency);
                    }
                    debug!("Chunk {} attempt {} via {}: {:?}", chunk.index, attempt, label, tiers);
                    if tiers.cancelled {
                        report.record_cancelled(attempt, label);
                        state = state.resolve(AttemptResult::Cancelled, self.policy.max_attempts);
                    } else {
                        report.record_success(attempt, label);
                        state = state.resolve(AttemptResult::Succeeded, self.policy.max_attempts);
                    }
                }
                Err(QuoteFetchError::Cancelled) => {
                    report.record_cancelled(attempt, label);
                    state = state.resolve(AttemptResult::Cancelled, self.policy.max_attempts);
                }
                Err(e) => {
                    let blocked = e.is_block_signature();
                    if let (Some(registry), Some(id)) = (&self.registry, &identity) {
                        registry.record_failure(id, &e.to_string());
                        excluded.insert(id.clone());
                    }
                    warn!(
                        "Chunk {} attempt {}/{} via {} failed: {}",
                        chunk.index, attempt, self.policy.max_attempts, label, e
                    );
                    report.record_error(attempt, label, blocked, e.to_string());
                    state = state.resolve(AttemptResult::Failed, self.policy.max_attempts);

                    if let ChunkState::RetryQueued { attempts } = state {
                        let delay = deadline.cap(self.policy.delay_for(attempts - 1));
                        self.sleeper.sleep(delay).await;
                    }
                }
            }

            if let (Some(registry), Some(id)) = (&self.registry, &identity) {
                registry.release(id);
            }
            last_failed = identity;
        }

        report.state = state;
        if report.is_exhausted() {
            warn!("{}", report.summary());
        } else {
            debug!("{}", report.summary());
        }
        report
    }

    /// One attempt: fresh session, full pipeline. The session is dropped after.
    async fn attempt(
        &self,
        identity: Option<ProxyAddr>,
        chunk: &Chunk,
        book: &QuoteBook,
        deadline: &RunDeadline,
    ) -> Result<TierReport, QuoteFetchError> {
        deadline.check()?;
        let session = self.sessions.create(identity).await?;
        self.pipeline
            .run(&session, &chunk.symbols, book, deadline)
            .await
    }
}
