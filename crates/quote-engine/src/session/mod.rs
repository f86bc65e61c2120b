//! Outbound sessions bound to at most one proxy identity.
//!
//! A [`FetchSession`] is owned by exactly one chunk attempt. It is never
//! shared between workers and is dropped (not repaired) when the upstream
//! rejects its authentication.

mod user_agents;

pub use user_agents::UserAgentPool;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

use crate::errors::QuoteFetchError;
use crate::models::{identity_label, ProxyAddr};
use crate::provider::QuoteUpstream;

/// Authentication artifacts obtained during warm-up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionAuth {
    pub cookie: String,
    pub crumb: String,
}

/// An HTTP client bound to one identity, plus its warmed auth state.
#[derive(Debug)]
pub struct FetchSession {
    id: u64,
    identity: Option<ProxyAddr>,
    user_agent: String,
    client: reqwest::Client,
    auth: Option<SessionAuth>,
}

impl FetchSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Proxy this session routes through, `None` for direct.
    pub fn identity(&self) -> Option<&ProxyAddr> {
        self.identity.as_ref()
    }

    /// Identity label for logs and errors.
    pub fn identity_label(&self) -> String {
        identity_label(self.identity.as_ref())
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn auth(&self) -> Option<&SessionAuth> {
        self.auth.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json,text/plain,*/*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

/// Builds sessions and runs the upstream's warm-up sequence once per session.
pub struct SessionFactory {
    upstream: Arc<dyn QuoteUpstream>,
    timeout: Duration,
    agents: UserAgentPool,
    next_id: AtomicU64,
}

impl SessionFactory {
    pub fn new(upstream: Arc<dyn QuoteUpstream>, timeout: Duration) -> Self {
        Self::with_user_agents(upstream, timeout, UserAgentPool::default())
    }

    pub fn with_user_agents(
        upstream: Arc<dyn QuoteUpstream>,
        timeout: Duration,
        agents: UserAgentPool,
    ) -> Self {
        Self {
            upstream,
            timeout,
            agents,
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a session for `identity` (or a direct one) and warm it up.
    ///
    /// Warm-up failures are logged and swallowed; the session is returned
    /// unauthenticated. Only an unusable proxy address is an error.
    pub async fn create(
        &self,
        identity: Option<ProxyAddr>,
    ) -> Result<FetchSession, QuoteFetchError> {
        let user_agent = self.agents.next_agent().to_string();

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(user_agent.clone())
            .default_headers(default_headers());

        if let Some(addr) = &identity {
            let proxy =
                reqwest::Proxy::all(addr.as_ref()).map_err(|e| QuoteFetchError::InvalidProxy {
                    address: addr.to_string(),
                    message: e.to_string(),
                })?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder.build()?;

        let mut session = FetchSession {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            identity,
            user_agent,
            client,
            auth: None,
        };

        match self.upstream.warm_up(&session).await {
            Ok(auth) => {
                debug!(
                    "Session {} via {} warmed up (authenticated: {})",
                    session.id,
                    session.identity_label(),
                    auth.is_some()
                );
                session.auth = auth;
            }
            Err(e) => {
                warn!(
                    "Session {} via {} warm-up failed, continuing unauthenticated: {}",
                    session.id,
                    session.identity_label(),
                    e
                );
            }
        }

        Ok(session)
    }
}
