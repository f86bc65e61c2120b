//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_WORKERS: usize = 8;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CHUNK_SIZE: usize = 50;
const MAX_CHUNK_SIZE: usize = 250;
const DEFAULT_PROXY_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_PROXY_COOLDOWN: Duration = Duration::from_secs(300);
const DEFAULT_MAX_CHUNK_ATTEMPTS: u32 = 4;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(2);
const DEFAULT_BACKOFF_JITTER: f64 = 0.25;
const DEFAULT_REQUIRED_COMPLETENESS: f64 = 0.95;
const DEFAULT_HISTORY_DAYS: u32 = 5;

/// Tunables for one acquisition run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on chunks in flight.
    pub workers: usize,
    /// Per-request timeout applied to every upstream call.
    pub request_timeout: Duration,
    /// Symbols per chunk (and per bulk call).
    pub chunk_size: usize,
    /// Route requests through the proxy pool.
    pub proxy_enabled: bool,
    /// Consecutive failures before an identity is blocked.
    pub proxy_failure_threshold: u32,
    /// How long a blocked identity stays out of rotation.
    pub proxy_cooldown: Duration,
    /// Attempts per chunk, including the first.
    pub max_chunk_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Fraction of each backoff delay applied as +/- jitter.
    pub backoff_jitter: f64,
    /// Minimum spacing between chunk dispatches across all workers.
    pub min_dispatch_interval: Duration,
    /// Completeness ratio the run is expected to reach. Only flags the result.
    pub required_completeness: f64,
    /// Wall-clock target the run is expected to meet. Only flags the result.
    pub runtime_target: Option<Duration>,
    /// Hard deadline after which no new requests are issued.
    pub run_deadline: Option<Duration>,
    /// Daily bars requested by the history tier.
    pub history_days: u32,
    /// Quote types kept in the result set (uppercase, e.g. "EQUITY").
    pub allowed_quote_types: Vec<String>,
    /// Use average volume when live volume is missing after every tier.
    pub substitute_average_volume: bool,
    /// Drop incomplete records from the result set.
    pub require_complete: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            proxy_enabled: false,
            proxy_failure_threshold: DEFAULT_PROXY_FAILURE_THRESHOLD,
            proxy_cooldown: DEFAULT_PROXY_COOLDOWN,
            max_chunk_attempts: DEFAULT_MAX_CHUNK_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            backoff_jitter: DEFAULT_BACKOFF_JITTER,
            min_dispatch_interval: Duration::ZERO,
            required_completeness: DEFAULT_REQUIRED_COMPLETENESS,
            runtime_target: None,
            run_deadline: None,
            history_days: DEFAULT_HISTORY_DAYS,
            allowed_quote_types: vec!["EQUITY".to_string()],
            substitute_average_volume: false,
            require_complete: false,
        }
    }
}

impl EngineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_proxies(mut self, enabled: bool) -> Self {
        self.proxy_enabled = enabled;
        self
    }

    pub fn with_proxy_health(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.proxy_failure_threshold = failure_threshold;
        self.proxy_cooldown = cooldown;
        self
    }

    pub fn with_max_chunk_attempts(mut self, attempts: u32) -> Self {
        self.max_chunk_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration, jitter: f64) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self.backoff_jitter = jitter;
        self
    }

    pub fn with_min_dispatch_interval(mut self, interval: Duration) -> Self {
        self.min_dispatch_interval = interval;
        self
    }

    pub fn with_required_completeness(mut self, ratio: f64) -> Self {
        self.required_completeness = ratio;
        self
    }

    pub fn with_runtime_target(mut self, target: Option<Duration>) -> Self {
        self.runtime_target = target;
        self
    }

    pub fn with_run_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn with_average_volume_substitution(mut self, enabled: bool) -> Self {
        self.substitute_average_volume = enabled;
        self
    }

    pub fn with_require_complete(mut self, required: bool) -> Self {
        self.require_complete = required;
        self
    }

    /// Clamp every value into its usable range.
    pub fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.chunk_size = self.chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self.proxy_failure_threshold = self.proxy_failure_threshold.max(1);
        self.max_chunk_attempts = self.max_chunk_attempts.max(1);
        self.backoff_cap = self.backoff_cap.max(self.backoff_base);
        self.backoff_jitter = if self.backoff_jitter.is_finite() {
            self.backoff_jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.required_completeness = if self.required_completeness.is_finite() {
            self.required_completeness.clamp(0.0, 1.0)
        } else {
            DEFAULT_REQUIRED_COMPLETENESS
        };
        self.history_days = self.history_days.clamp(2, 30);
        self.allowed_quote_types = self
            .allowed_quote_types
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// Whether a quote type passes the filter. Unknown types pass.
    pub fn allows_quote_type(&self, quote_type: Option<&str>) -> bool {
        match quote_type {
            None => true,
            Some(_) if self.allowed_quote_types.is_empty() => true,
            Some(t) => self
                .allowed_quote_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(t)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.workers, 8);
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.proxy_failure_threshold, 3);
        assert_eq!(config.max_chunk_attempts, 4);
        assert_eq!(config.backoff_base, Duration::from_millis(500));
        assert_eq!(config.backoff_cap, Duration::from_secs(2));
        assert!(!config.proxy_enabled);
        assert!(!config.substitute_average_volume);
    }

    #[test]
    fn test_normalized_clamps() {
        let config = EngineConfig::default()
            .with_workers(0)
            .with_chunk_size(10_000)
            .with_max_chunk_attempts(0)
            .with_backoff(Duration::from_secs(3), Duration::from_secs(1), 4.0)
            .with_required_completeness(1.7)
            .normalized();

        assert_eq!(config.workers, 1);
        assert_eq!(config.chunk_size, MAX_CHUNK_SIZE);
        assert_eq!(config.max_chunk_attempts, 1);
        assert_eq!(config.backoff_cap, Duration::from_secs(3));
        assert_eq!(config.backoff_jitter, 1.0);
        assert_eq!(config.required_completeness, 1.0);
    }

    #[test]
    fn test_allows_quote_type() {
        let config = EngineConfig::default().normalized();
        assert!(config.allows_quote_type(Some("EQUITY")));
        assert!(config.allows_quote_type(Some("equity")));
        assert!(!config.allows_quote_type(Some("ETF")));
        assert!(config.allows_quote_type(None));
    }

    #[test]
    fn test_empty_allow_list_accepts_everything() {
        let mut config = EngineConfig::default();
        config.allowed_quote_types.clear();
        assert!(config.allows_quote_type(Some("MUTUALFUND")));
    }
}
