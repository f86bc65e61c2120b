//! Batch quote acquisition engine.
//!
//! One [`BatchQuoteEngine::run`] call performs a complete scan:
//!
//! 1. List the universe, normalize and pattern-filter it
//! 2. Drop denylisted symbols
//! 3. Load and normalize proxy candidates (when proxying)
//! 4. Chunk the batch and let the scheduler drive every chunk
//! 5. Evaluate quality, quarantine data-less symbols, persist the denylist
//!
//! The run always returns a best-effort [`ScanOutcome`]. Only a failing
//! universe provider aborts it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::EngineConfig;
use crate::errors::QuoteFetchError;
use crate::models::{is_standard_symbol, QuoteRecord, ScanStatistics, SymbolBatch};
use crate::pipeline::{QuoteBook, TieredFetchPipeline};
use crate::provider::QuoteUpstream;
use crate::proxy::{
    normalize_candidates, ProxyHealthConfig, ProxyHealthRegistry, ProxyMetrics, ProxySupply,
};
use crate::quality::{Denylist, DenylistStore, QualityEvaluator, RecordValidator};
use crate::scheduler::{
    BackoffPolicy, ChunkReport, ChunkScheduler, ChunkState, DispatchThrottle, RunDeadline,
};
use crate::session::{SessionFactory, UserAgentPool};
use crate::universe::SymbolUniverse;

/// Everything a scan produces.
#[derive(Clone, Debug, Serialize)]
pub struct ScanOutcome {
    /// Accepted records keyed by symbol.
    pub records: BTreeMap<String, QuoteRecord>,
    pub statistics: ScanStatistics,
    /// Symbols that produced no data this run.
    pub denylist_candidates: BTreeSet<String>,
    pub chunk_reports: Vec<ChunkReport>,
    /// Per-identity health at the end of the run. Empty when direct.
    pub proxy_metrics: Vec<ProxyMetrics>,
}

/// Consumer of a finished scan (storage, export, etc.).
#[async_trait]
pub trait QuoteSink: Send + Sync {
    async fn publish(&self, outcome: &ScanOutcome) -> Result<(), QuoteFetchError>;
}

pub struct BatchQuoteEngine {
    config: EngineConfig,
    upstream: Arc<dyn QuoteUpstream>,
    universe: Arc<dyn SymbolUniverse>,
    proxy_supply: Option<Arc<dyn ProxySupply>>,
    denylist_store: Option<Arc<dyn DenylistStore>>,
    validator: RecordValidator,
    user_agents: Vec<String>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl BatchQuoteEngine {
    pub fn new(
        config: EngineConfig,
        upstream: Arc<dyn QuoteUpstream>,
        universe: Arc<dyn SymbolUniverse>,
    ) -> Self {
        Self {
            config: config.normalized(),
            upstream,
            universe,
            proxy_supply: None,
            denylist_store: None,
            validator: RecordValidator::new(),
            user_agents: Vec::new(),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_proxy_supply(mut self, supply: Arc<dyn ProxySupply>) -> Self {
        self.proxy_supply = Some(supply);
        self
    }

    pub fn with_denylist(mut self, store: Arc<dyn DenylistStore>) -> Self {
        self.denylist_store = Some(store);
        self
    }

    pub fn with_validator(mut self, validator: RecordValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Replace the built-in user agents. An empty list keeps them.
    pub fn with_user_agents(mut self, agents: Vec<String>) -> Self {
        self.user_agents = agents;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one complete scan.
    pub async fn run(&self) -> Result<ScanOutcome, QuoteFetchError> {
        let started = self.clock.now();
        let deadline = RunDeadline::new(self.clock.clone(), self.config.run_deadline);

        let raw = self.universe.list_symbols().await?;
        let mut batch = SymbolBatch::new(&raw);
        let pattern_filtered = batch.retain_partition(is_standard_symbol).len();
        if pattern_filtered > 0 {
            debug!("Filtered {} non-standard symbols", pattern_filtered);
        }

        let mut denylist = self.load_denylist().await;
        let denylisted_skipped = denylist.filter(&mut batch).len();

        let registry = self.build_registry().await;
        let proxied = registry.is_some();

        info!(
            "Starting scan: {} symbols ({} pattern-filtered, {} denylisted), {} mode via {}",
            batch.len(),
            pattern_filtered,
            denylisted_skipped,
            if proxied { "proxied" } else { "direct" },
            self.upstream.id()
        );

        let chunks = batch.chunks(self.config.chunk_size);
        let book = QuoteBook::new();
        let reports = self
            .scheduler(registry.clone())
            .run(chunks.clone(), &book, &deadline)
            .await;

        let result = book.into_result(
            self.config.substitute_average_volume,
            self.config.require_complete,
        );

        // Symbols of exhausted chunks never got a fair hearing
        let unresolved: HashSet<&String> = reports
            .iter()
            .filter(|r| r.is_exhausted())
            .filter_map(|r| chunks.get(r.index))
            .flat_map(|c| c.symbols.iter())
            .collect();
        let denylist_candidates: BTreeSet<String> = result
            .denylist_candidates
            .into_iter()
            .filter(|s| !unresolved.contains(s))
            .collect();

        let elapsed = self.clock.now().saturating_duration_since(started);
        let mut statistics =
            QualityEvaluator::from_config(&self.config).evaluate(&result.records, batch.len(), elapsed);
        statistics.non_equity_count = result.non_equity.len();
        statistics.denylisted_skipped = denylisted_skipped;
        statistics.pattern_filtered = pattern_filtered;
        statistics.rate_limited_chunks = reports.iter().filter(|r| r.rate_limited).count();
        statistics.exhausted_chunks = reports.iter().filter(|r| r.is_exhausted()).count();
        statistics.proxy_rotations = reports.iter().map(|r| r.rotations).sum();
        statistics.volume_substitutions = result.volume_substitutions;
        statistics.cancelled = reports
            .iter()
            .any(|r| matches!(r.state, ChunkState::Cancelled { .. }));
        statistics.newly_denylisted = denylist.quarantine(denylist_candidates.iter().cloned());

        if statistics.newly_denylisted > 0 {
            self.save_denylist(&denylist).await;
        }

        info!("Scan finished: {}", statistics.summary());
        if !statistics.met_targets() {
            warn!(
                "Scan missed its targets (completeness {:.3} vs {:.3}, runtime met: {})",
                statistics.completeness_ratio,
                self.config.required_completeness,
                statistics.met_runtime_target
            );
        }

        Ok(ScanOutcome {
            records: result.records,
            statistics,
            denylist_candidates,
            chunk_reports: reports,
            proxy_metrics: registry.map(|r| r.snapshot()).unwrap_or_default(),
        })
    }

    /// Run a scan and hand the outcome to `sink`.
    pub async fn run_into(&self, sink: &dyn QuoteSink) -> Result<ScanOutcome, QuoteFetchError> {
        let outcome = self.run().await?;
        sink.publish(&outcome).await?;
        Ok(outcome)
    }

    fn scheduler(&self, registry: Option<Arc<ProxyHealthRegistry>>) -> ChunkScheduler {
        let pipeline = TieredFetchPipeline::new(
            self.upstream.clone(),
            self.config.clone(),
            self.sleeper.clone(),
        )
        .with_validator(self.validator.clone())
        .with_clock(self.clock.clone());

        let sessions = SessionFactory::with_user_agents(
            self.upstream.clone(),
            self.config.request_timeout,
            UserAgentPool::new(self.user_agents.clone()),
        );

        let throttle = DispatchThrottle::new(
            self.config.min_dispatch_interval,
            self.clock.clone(),
            self.sleeper.clone(),
        );

        ChunkScheduler::new(
            Arc::new(pipeline),
            Arc::new(sessions),
            registry,
            BackoffPolicy::from_config(&self.config),
            Arc::new(throttle),
            self.sleeper.clone(),
            self.config.workers,
        )
    }

    async fn load_denylist(&self) -> Denylist {
        let Some(store) = &self.denylist_store else {
            return Denylist::default();
        };
        match store.load().await {
            Ok(symbols) => {
                debug!("Loaded {} denylisted symbols", symbols.len());
                Denylist::new(symbols)
            }
            Err(e) => {
                warn!("Failed to load denylist, scanning without it: {}", e);
                Denylist::default()
            }
        }
    }

    async fn save_denylist(&self, denylist: &Denylist) {
        let Some(store) = &self.denylist_store else {
            return;
        };
        if let Err(e) = store.save(denylist.symbols()).await {
            warn!("Failed to save denylist: {}", e);
        }
    }

    /// `None` means direct mode: proxying is off, or no usable candidate.
    async fn build_registry(&self) -> Option<Arc<ProxyHealthRegistry>> {
        if !self.config.proxy_enabled {
            return None;
        }
        let Some(supply) = &self.proxy_supply else {
            warn!("Proxying enabled but no proxy supply configured, going direct");
            return None;
        };

        let candidates = match supply.load_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Failed to load proxy candidates, going direct: {}", e);
                return None;
            }
        };

        let identities = normalize_candidates(&candidates);
        if identities.is_empty() {
            warn!("No usable proxy candidates, going direct");
            return None;
        }
        info!("Loaded {} proxy identities", identities.len());

        Some(Arc::new(ProxyHealthRegistry::with_config(
            identities,
            ProxyHealthConfig {
                failure_threshold: self.config.proxy_failure_threshold,
                cooldown: self.config.proxy_cooldown,
            },
            self.clock.clone(),
        )))
    }
}
