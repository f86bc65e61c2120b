//! Recognition of throttling and authentication-block signatures.

use crate::errors::QuoteFetchError;

/// Body fragments that mean the identity is being throttled.
const RATE_LIMIT_BODY_PATTERNS: &[&str] = &["too many requests"];

/// Body fragments that mean the session's cookie or crumb was rejected.
const AUTH_BODY_PATTERNS: &[&str] = &["invalid crumb", "invalid cookie", "unauthorized"];

fn is_rate_limit_status(status: u16) -> bool {
    // 999 is the upstream's non-standard "request denied" status
    status == 429 || status == 999
}

fn is_auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

/// Whether a body should be scanned for signature text.
///
/// Successful JSON documents are only scanned when they carry an error object,
/// so an instrument named "Unauthorized Holdings" is not mistaken for a block.
fn should_scan_body(status: u16, body: &str) -> bool {
    if !(200..300).contains(&status) {
        return true;
    }
    let trimmed = body.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return true;
    }
    body.contains("\"error\":{")
}

/// Match a body against the signature patterns.
pub fn classify_body(body: &str, identity: &str) -> Option<QuoteFetchError> {
    let lower = body.to_ascii_lowercase();

    if let Some(pattern) = RATE_LIMIT_BODY_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Some(QuoteFetchError::RateLimited {
            identity: identity.to_string(),
            signature: format!("body: {}", pattern),
        });
    }
    if let Some(pattern) = AUTH_BODY_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Some(QuoteFetchError::AuthRejected {
            identity: identity.to_string(),
            signature: format!("body: {}", pattern),
        });
    }
    None
}

/// Turn a status and body into an error, or `Ok` when the response is usable.
///
/// `symbol` is the single instrument the request was for, if any; a 404 is
/// only reported as "not found" when it can be attributed to one symbol.
pub fn check_response(
    status: u16,
    body: &str,
    identity: &str,
    symbol: Option<&str>,
) -> Result<(), QuoteFetchError> {
    if is_rate_limit_status(status) {
        return Err(QuoteFetchError::RateLimited {
            identity: identity.to_string(),
            signature: format!("HTTP {}", status),
        });
    }
    if is_auth_status(status) {
        return Err(QuoteFetchError::AuthRejected {
            identity: identity.to_string(),
            signature: format!("HTTP {}", status),
        });
    }

    if should_scan_body(status, body) {
        if let Some(err) = classify_body(body, identity) {
            return Err(err);
        }
    }

    match (status, symbol) {
        (200..=299, _) => Ok(()),
        (404, Some(symbol)) => Err(QuoteFetchError::SymbolNotFound(symbol.to_string())),
        (status, _) => Err(QuoteFetchError::Upstream { status }),
    }
}
