use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use quotescan_engine::EngineConfig;

pub struct Config {
    pub symbols_path: PathBuf,
    pub proxies_path: Option<PathBuf>,
    pub denylist_path: PathBuf,
    pub output_path: PathBuf,
    pub user_agents_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values use defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parsed = |key: &str| var(key).and_then(|v| v.parse::<u64>().ok());

        let defaults = EngineConfig::default();
        let mut engine = defaults.clone();

        engine.workers = parse_or(var("QS_WORKERS"), defaults.workers);
        engine.request_timeout = parsed("QS_REQUEST_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        engine.chunk_size = parse_or(var("QS_CHUNK_SIZE"), defaults.chunk_size);
        engine.proxy_enabled = var("QS_PROXY_ENABLED")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.proxy_enabled);
        engine.proxy_failure_threshold =
            parse_or(var("QS_PROXY_FAILURE_THRESHOLD"), defaults.proxy_failure_threshold);
        engine.proxy_cooldown = parsed("QS_PROXY_COOLDOWN_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.proxy_cooldown);
        engine.max_chunk_attempts =
            parse_or(var("QS_MAX_CHUNK_ATTEMPTS"), defaults.max_chunk_attempts);
        engine.backoff_base = parsed("QS_BACKOFF_BASE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff_base);
        engine.backoff_cap = parsed("QS_BACKOFF_CAP_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff_cap);
        engine.backoff_jitter = parse_or(var("QS_BACKOFF_JITTER"), defaults.backoff_jitter);
        engine.min_dispatch_interval = parsed("QS_MIN_DISPATCH_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.min_dispatch_interval);
        engine.required_completeness =
            parse_or(var("QS_REQUIRED_COMPLETENESS"), defaults.required_completeness);
        engine.runtime_target = parsed("QS_RUNTIME_TARGET_SECS").map(Duration::from_secs);
        engine.run_deadline = parsed("QS_RUN_DEADLINE_SECS").map(Duration::from_secs);
        engine.history_days = parse_or(var("QS_HISTORY_DAYS"), defaults.history_days);
        if let Some(types) = var("QS_ALLOWED_QUOTE_TYPES") {
            engine.allowed_quote_types = types
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        engine.substitute_average_volume = var("QS_SUBSTITUTE_AVERAGE_VOLUME")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.substitute_average_volume);
        engine.require_complete = var("QS_REQUIRE_COMPLETE")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.require_complete);

        Self {
            symbols_path: var("QS_SYMBOLS_FILE")
                .unwrap_or_else(|| "symbols.txt".into())
                .into(),
            proxies_path: var("QS_PROXIES_FILE").map(PathBuf::from),
            denylist_path: var("QS_DENYLIST_PATH")
                .unwrap_or_else(|| "./state/denylist.json".into())
                .into(),
            output_path: var("QS_OUTPUT_PATH")
                .unwrap_or_else(|| "scan.json".into())
                .into(),
            user_agents_path: var("QS_USER_AGENTS_FILE").map(PathBuf::from),
            engine: engine.normalized(),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
