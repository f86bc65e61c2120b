//! Quotescan Engine Crate
//!
//! Batch acquisition of near-real-time quotes for large ticker universes
//! from a rate-limited upstream.
//!
//! # Overview
//!
//! The engine supports:
//! - A pool of proxy identities with health scoring and automatic quarantine
//! - Three fetch tiers: bulk quotes, per-symbol summaries, daily-bar reconstruction
//! - Chunked, bounded concurrency with identity rotation and jittered backoff
//! - Completeness and null/zero gating, plus a durable denylist
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  SymbolUniverse  | --> |   SymbolBatch    |  (normalized, filtered, denylisted)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+     +---------------------+
//!                          |  ChunkScheduler  | <-> | ProxyHealthRegistry |
//!                          +------------------+     +---------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  SessionFactory  |  (one session per attempt)
//!                          +------------------+
//!                                  |
//!                                  v
//!                       +---------------------+
//!                       | TieredFetchPipeline |  (bulk -> summary -> history)
//!                       +---------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    QuoteBook     |  (shared, merge-only)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | QualityEvaluator |  (statistics, denylist)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`BatchQuoteEngine`] - Runs one scan end to end
//! - [`QuoteRecord`] - Normalized per-symbol quote
//! - [`ScanStatistics`] - Completeness, quality and SLO flags for a run
//! - [`ScanOutcome`] - Records, statistics and diagnostics returned by a run
//! - [`QuoteUpstream`] - Provider seam; [`YahooUpstream`] is the built-in one

pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod proxy;
pub mod quality;
pub mod scheduler;
pub mod session;
pub mod universe;

pub use clock::{Clock, InstantSleeper, ManualClock, Sleeper, SystemClock, TokioSleeper};
pub use config::EngineConfig;
pub use engine::{BatchQuoteEngine, QuoteSink, ScanOutcome};
pub use errors::{QuoteFetchError, RetryClass};
pub use models::{
    identity_label, is_standard_symbol, normalize_symbol, Chunk, CoreField, FetchTier,
    FieldQuality, ProxyAddr, QualitySummary, QuoteRecord, ScanStatistics, SymbolBatch,
    DIRECT_IDENTITY,
};
pub use pipeline::{QuoteBook, TierReport, TieredFetchPipeline};
pub use provider::{QuoteUpstream, YahooUpstream};
pub use proxy::{
    normalize_candidates, normalize_proxy_address, ProxyHealthConfig, ProxyHealthRegistry,
    ProxyMetrics, ProxySupply, StaticProxySupply,
};
pub use quality::{
    Denylist, DenylistStore, InMemoryDenylist, JsonFileDenylist, QualityEvaluator,
    RecordValidator,
};
pub use scheduler::{
    AttemptOutcome, BackoffPolicy, ChunkReport, ChunkScheduler, ChunkState, RunDeadline,
};
pub use session::{FetchSession, SessionAuth, SessionFactory, UserAgentPool};
pub use universe::{StaticUniverse, SymbolUniverse};
