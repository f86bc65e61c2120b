use std::sync::Arc;

/// Fully qualified proxy address (e.g., "http://10.0.0.7:3128").
pub type ProxyAddr = Arc<str>;

/// Label used in logs and errors when a session has no proxy.
pub const DIRECT_IDENTITY: &str = "direct";

/// Label for an optional identity.
pub fn identity_label(identity: Option<&ProxyAddr>) -> String {
    identity
        .map(|p| p.to_string())
        .unwrap_or_else(|| DIRECT_IDENTITY.to_string())
}
