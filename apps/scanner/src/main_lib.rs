use std::sync::Arc;

use quotescan_engine::{BatchQuoteEngine, JsonFileDenylist, YahooUpstream};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::sources::{read_lines, FileProxySupply, FileUniverse};

pub fn init_tracing() {
    let log_format = std::env::var("QS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_engine(config: &Config) -> anyhow::Result<BatchQuoteEngine> {
    let upstream = Arc::new(YahooUpstream::new());
    let universe = Arc::new(FileUniverse::new(&config.symbols_path));

    let mut engine = BatchQuoteEngine::new(config.engine.clone(), upstream, universe)
        .with_denylist(Arc::new(JsonFileDenylist::new(&config.denylist_path)));

    if let Some(path) = &config.proxies_path {
        engine = engine.with_proxy_supply(Arc::new(FileProxySupply::new(path)));
    } else if config.engine.proxy_enabled {
        tracing::warn!("QS_PROXY_ENABLED is set but QS_PROXIES_FILE is not; scanning direct");
    }

    if let Some(path) = &config.user_agents_path {
        let agents = read_lines(path).await?;
        tracing::info!("Loaded {} user agents from {}", agents.len(), path.display());
        engine = engine.with_user_agents(agents);
    }

    Ok(engine)
}
