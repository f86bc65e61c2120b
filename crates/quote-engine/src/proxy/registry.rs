//! Per-identity health tracking for the proxy pool.
//!
//! Each proxy identity moves between two states:
//!
//! - **Available**: eligible for selection, ranked by score.
//! - **Blocked**: excluded from selection after `failure_threshold`
//!   consecutive failures, until `cooldown` has elapsed since the last failure.
//!
//! All mutation happens under a single mutex; workers call in concurrently.
//! The registry is in-memory and resets with every run.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::seq::IteratorRandom;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::models::ProxyAddr;

/// Default number of consecutive failures before an identity is blocked.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default time a blocked identity stays out of rotation.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Response-time samples kept per identity.
const RESPONSE_SAMPLE_WINDOW: usize = 10;

/// Assumed response time for identities with no samples yet.
const UNKNOWN_RESPONSE_SECS: f64 = 1.0;

/// Health state for a single identity.
#[derive(Debug)]
struct ProxyHealth {
    success_count: u64,
    /// Failures since the last success or reinstatement.
    failure_count: u32,
    /// Failures over the whole run, for the success rate.
    total_failures: u64,
    last_failure: Option<Instant>,
    last_failure_reason: Option<String>,
    blocked: bool,
    samples: VecDeque<Duration>,
    avg_response_time: Option<Duration>,
    /// Workers currently holding this identity.
    leases: u32,
}

impl ProxyHealth {
    fn new() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            total_failures: 0,
            last_failure: None,
            last_failure_reason: None,
            blocked: false,
            samples: VecDeque::with_capacity(RESPONSE_SAMPLE_WINDOW),
            avg_response_time: None,
            leases: 0,
        }
    }

    /// Laplace-smoothed so fresh identities start at 0.5.
    fn success_rate(&self) -> f64 {
        (self.success_count as f64 + 1.0) / ((self.success_count + self.total_failures) as f64 + 2.0)
    }

    /// Success rate discounted by average response time.
    fn score(&self) -> f64 {
        let avg_secs = self
            .avg_response_time
            .map(|d| d.as_secs_f64())
            .unwrap_or(UNKNOWN_RESPONSE_SECS);
        self.success_rate() / (1.0 + avg_secs)
    }

    fn push_sample(&mut self, response_time: Duration) {
        if self.samples.len() == RESPONSE_SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(response_time);
        let total: Duration = self.samples.iter().sum();
        self.avg_response_time = Some(total / self.samples.len() as u32);
    }

    fn cooldown_elapsed(&self, now: Instant, cooldown: Duration) -> bool {
        match self.last_failure {
            Some(last) => now.saturating_duration_since(last) >= cooldown,
            None => true,
        }
    }
}

/// Proxy registry configuration.
#[derive(Clone, Debug)]
pub struct ProxyHealthConfig {
    /// Consecutive failures before blocking.
    pub failure_threshold: u32,
    /// Time since the last failure before a blocked identity is reinstated.
    pub cooldown: Duration,
}

impl Default for ProxyHealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Health snapshot for a single identity.
#[derive(Clone, Debug, Serialize)]
pub struct ProxyMetrics {
    pub identity: ProxyAddr,
    pub success_count: u64,
    pub failure_count: u32,
    pub blocked: bool,
    pub avg_response_time: Option<Duration>,
    pub last_failure_reason: Option<String>,
}

/// Thread-safe health registry for the proxy pool.
pub struct ProxyHealthRegistry {
    identities: Mutex<BTreeMap<ProxyAddr, ProxyHealth>>,
    config: ProxyHealthConfig,
    clock: Arc<dyn Clock>,
}

impl ProxyHealthRegistry {
    /// Create a registry over the given identities with default settings.
    pub fn new<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = ProxyAddr>,
    {
        Self::with_config(identities, ProxyHealthConfig::default(), Arc::new(SystemClock))
    }

    /// Create a registry with custom thresholds and time source.
    pub fn with_config<I>(identities: I, config: ProxyHealthConfig, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = ProxyAddr>,
    {
        let identities = identities
            .into_iter()
            .map(|p| (p, ProxyHealth::new()))
            .collect();
        Self {
            identities: Mutex::new(identities),
            config,
            clock,
        }
    }

    /// Lock the identities mutex, recovering from poison if necessary.
    ///
    /// Worst case after recovery is a slightly stale health score.
    fn lock_identities(&self) -> MutexGuard<'_, BTreeMap<ProxyAddr, ProxyHealth>> {
        self.identities.lock().unwrap_or_else(|poisoned| {
            warn!("Proxy registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.lock_identities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_identities().is_empty()
    }

    /// Identities not currently blocked.
    pub fn available_count(&self) -> usize {
        self.lock_identities().values().filter(|h| !h.blocked).count()
    }

    /// Pick the best identity that is neither blocked nor excluded, and lease it.
    ///
    /// Falls back to an unblock sweep, then to a random identity. Returns
    /// `None` only for an empty pool. Every returned identity must be handed
    /// back with [`release`](Self::release).
    pub fn select(&self, excluding: &HashSet<ProxyAddr>) -> Option<ProxyAddr> {
        let mut identities = self.lock_identities();

        if identities.is_empty() {
            return None;
        }

        let chosen = match Self::best(&identities, excluding) {
            Some(best) => best,
            None => {
                let reinstated = self.sweep(&mut identities);
                match Self::best(&identities, excluding) {
                    Some(best) => best,
                    None => {
                        let fallback = identities.keys().choose(&mut rand::thread_rng()).cloned()?;
                        warn!(
                            "Proxy registry: no eligible identity ({} reinstated), falling back to '{}'",
                            reinstated, fallback
                        );
                        fallback
                    }
                }
            }
        };

        if let Some(health) = identities.get_mut(&chosen) {
            health.leases += 1;
        }
        debug!("Proxy registry: selected '{}'", chosen);
        Some(chosen)
    }

    /// Highest score among eligible identities, preferring unleased ones.
    /// Ties go to the lowest address.
    fn best(
        identities: &BTreeMap<ProxyAddr, ProxyHealth>,
        excluding: &HashSet<ProxyAddr>,
    ) -> Option<ProxyAddr> {
        let eligible: Vec<_> = identities
            .iter()
            .filter(|(addr, health)| !health.blocked && !excluding.contains(*addr))
            .collect();

        let idle: Vec<_> = eligible.iter().filter(|(_, h)| h.leases == 0).copied().collect();
        let pool = if idle.is_empty() { eligible } else { idle };

        let mut best: Option<(&ProxyAddr, f64)> = None;
        for (addr, health) in pool {
            let score = health.score();
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((addr, score)),
            }
        }
        best.map(|(addr, _)| addr.clone())
    }

    /// Reinstate blocked identities whose cooldown has elapsed.
    fn sweep(&self, identities: &mut BTreeMap<ProxyAddr, ProxyHealth>) -> usize {
        let now = self.clock.now();
        let mut reinstated = 0;
        for (addr, health) in identities.iter_mut() {
            if health.blocked && health.cooldown_elapsed(now, self.config.cooldown) {
                info!("Proxy registry: reinstating '{}' after cooldown", addr);
                health.blocked = false;
                health.failure_count = 0;
                reinstated += 1;
            }
        }
        reinstated
    }

    /// Run the unblock sweep explicitly. Returns how many were reinstated.
    pub fn unblock_expired(&self) -> usize {
        let mut identities = self.lock_identities();
        self.sweep(&mut identities)
    }

    /// Return a lease taken by [`select`](Self::select).
    pub fn release(&self, identity: &ProxyAddr) {
        let mut identities = self.lock_identities();
        if let Some(health) = identities.get_mut(identity) {
            health.leases = health.leases.saturating_sub(1);
        }
    }

    /// Record a successful request through an identity.
    pub fn record_success(&self, identity: &ProxyAddr, response_time: Duration) {
        let mut identities = self.lock_identities();
        let health = identities
            .entry(identity.clone())
            .or_insert_with(ProxyHealth::new);

        health.success_count += 1;
        health.failure_count = 0;
        if health.blocked {
            info!("Proxy registry: '{}' succeeded while blocked, unblocking", identity);
        }
        health.blocked = false;
        health.push_sample(response_time);
        debug!(
            "Proxy registry: success for '{}' in {:?} (avg {:?})",
            identity, response_time, health.avg_response_time
        );
    }

    /// Record a failed request through an identity.
    pub fn record_failure(&self, identity: &ProxyAddr, reason: &str) {
        let mut identities = self.lock_identities();
        let health = identities
            .entry(identity.clone())
            .or_insert_with(ProxyHealth::new);

        health.failure_count += 1;
        health.total_failures += 1;
        health.last_failure = Some(self.clock.now());
        health.last_failure_reason = Some(reason.to_string());

        if !health.blocked && health.failure_count >= self.config.failure_threshold {
            info!(
                "Proxy registry: blocking '{}' after {} failures ({})",
                identity, health.failure_count, reason
            );
            health.blocked = true;
        } else {
            debug!(
                "Proxy registry: failure for '{}' ({}/{}): {}",
                identity, health.failure_count, self.config.failure_threshold, reason
            );
        }
    }

    pub fn is_blocked(&self, identity: &ProxyAddr) -> bool {
        self.lock_identities()
            .get(identity)
            .map(|h| h.blocked)
            .unwrap_or(false)
    }

    pub fn failure_count(&self, identity: &ProxyAddr) -> u32 {
        self.lock_identities()
            .get(identity)
            .map(|h| h.failure_count)
            .unwrap_or(0)
    }

    /// Health metrics for every identity, ordered by address.
    pub fn snapshot(&self) -> Vec<ProxyMetrics> {
        self.lock_identities()
            .iter()
            .map(|(identity, health)| ProxyMetrics {
                identity: identity.clone(),
                success_count: health.success_count,
                failure_count: health.failure_count,
                blocked: health.blocked,
                avg_response_time: health.avg_response_time,
                last_failure_reason: health.last_failure_reason.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn addr(s: &str) -> ProxyAddr {
        ProxyAddr::from(s)
    }

    fn registry_with_clock(
        addrs: &[&str],
        threshold: u32,
        cooldown: Duration,
    ) -> (ProxyHealthRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let registry = ProxyHealthRegistry::with_config(
            addrs.iter().map(|a| addr(a)),
            ProxyHealthConfig {
                failure_threshold: threshold,
                cooldown,
            },
            clock.clone(),
        );
        (registry, clock)
    }

    #[test]
    fn test_empty_pool_selects_none() {
        let registry = ProxyHealthRegistry::new(Vec::<ProxyAddr>::new());
        assert!(registry.select(&HashSet::new()).is_none());
    }

    #[test]
    fn test_blocks_at_threshold() {
        let (registry, _clock) =
            registry_with_clock(&["http://a:1"], 3, Duration::from_secs(60));
        let p = addr("http://a:1");

        registry.record_failure(&p, "HTTP 429");
        registry.record_failure(&p, "HTTP 429");
        assert!(!registry.is_blocked(&p));

        registry.record_failure(&p, "HTTP 429");
        assert!(registry.is_blocked(&p));
        assert_eq!(registry.available_count(), 0);
    }

    #[test]
    fn test_success_resets_failures_and_unblocks() {
        let (registry, _clock) =
            registry_with_clock(&["http://a:1"], 2, Duration::from_secs(60));
        let p = addr("http://a:1");

        registry.record_failure(&p, "timeout");
        registry.record_failure(&p, "timeout");
        assert!(registry.is_blocked(&p));

        registry.record_success(&p, Duration::from_millis(200));
        assert!(!registry.is_blocked(&p));
        assert_eq!(registry.failure_count(&p), 0);
    }

    #[test]
    fn test_unblock_only_after_cooldown() {
        let (registry, clock) =
            registry_with_clock(&["http://a:1"], 1, Duration::from_secs(60));
        let p = addr("http://a:1");

        registry.record_failure(&p, "HTTP 429");
        assert!(registry.is_blocked(&p));

        clock.advance(Duration::from_secs(59));
        assert_eq!(registry.unblock_expired(), 0);
        assert!(registry.is_blocked(&p));

        clock.advance(Duration::from_secs(1));
        assert_eq!(registry.unblock_expired(), 1);
        assert!(!registry.is_blocked(&p));
        assert_eq!(registry.failure_count(&p), 0);
    }

    #[test]
    fn test_cooldown_measured_from_last_failure() {
        let (registry, clock) =
            registry_with_clock(&["http://a:1"], 1, Duration::from_secs(60));
        let p = addr("http://a:1");

        registry.record_failure(&p, "HTTP 429");
        clock.advance(Duration::from_secs(50));
        // Another failure while blocked pushes the cooldown out
        registry.record_failure(&p, "HTTP 429");
        clock.advance(Duration::from_secs(50));
        assert_eq!(registry.unblock_expired(), 0);

        clock.advance(Duration::from_secs(10));
        assert_eq!(registry.unblock_expired(), 1);
    }

    #[test]
    fn test_select_skips_blocked_and_excluded() {
        let (registry, _clock) = registry_with_clock(
            &["http://a:1", "http://b:1", "http://c:1"],
            1,
            Duration::from_secs(60),
        );
        registry.record_failure(&addr("http://a:1"), "HTTP 429");

        let excluding: HashSet<_> = [addr("http://b:1")].into_iter().collect();
        assert_eq!(registry.select(&excluding), Some(addr("http://c:1")));
    }

    #[test]
    fn test_select_prefers_better_score() {
        let (registry, _clock) = registry_with_clock(
            &["http://a:1", "http://b:1"],
            5,
            Duration::from_secs(60),
        );
        registry.record_success(&addr("http://b:1"), Duration::from_millis(100));
        registry.record_failure(&addr("http://a:1"), "timeout");

        assert_eq!(registry.select(&HashSet::new()), Some(addr("http://b:1")));
    }

    #[test]
    fn test_select_spreads_leases() {
        let (registry, _clock) = registry_with_clock(
            &["http://a:1", "http://b:1"],
            3,
            Duration::from_secs(60),
        );

        let first = registry.select(&HashSet::new()).unwrap();
        let second = registry.select(&HashSet::new()).unwrap();
        assert_ne!(first, second);

        registry.release(&first);
        assert_eq!(registry.select(&HashSet::new()), Some(first));
    }

    #[test]
    fn test_select_sweeps_before_falling_back() {
        let (registry, clock) =
            registry_with_clock(&["http://a:1"], 1, Duration::from_secs(60));
        let p = addr("http://a:1");
        registry.record_failure(&p, "HTTP 429");

        clock.advance(Duration::from_secs(61));
        assert_eq!(registry.select(&HashSet::new()), Some(p.clone()));
        assert!(!registry.is_blocked(&p));
    }

    #[test]
    fn test_select_falls_back_to_random_identity() {
        let (registry, _clock) =
            registry_with_clock(&["http://a:1", "http://b:1"], 1, Duration::from_secs(60));
        registry.record_failure(&addr("http://a:1"), "HTTP 429");
        registry.record_failure(&addr("http://b:1"), "HTTP 429");

        let chosen = registry.select(&HashSet::new());
        assert!(chosen.is_some());
        // The fallback does not reinstate anything
        assert_eq!(registry.available_count(), 0);
    }

    #[test]
    fn test_response_time_ring_is_bounded() {
        let (registry, _clock) =
            registry_with_clock(&["http://a:1"], 3, Duration::from_secs(60));
        let p = addr("http://a:1");

        for _ in 0..RESPONSE_SAMPLE_WINDOW {
            registry.record_success(&p, Duration::from_secs(10));
        }
        for _ in 0..RESPONSE_SAMPLE_WINDOW {
            registry.record_success(&p, Duration::from_millis(100));
        }

        let metrics = registry.snapshot();
        assert_eq!(metrics[0].avg_response_time, Some(Duration::from_millis(100)));
        assert_eq!(metrics[0].success_count, 2 * RESPONSE_SAMPLE_WINDOW as u64);
    }
}
