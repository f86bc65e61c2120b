use std::collections::HashSet;

use log::warn;

use crate::errors::QuoteFetchError;
use crate::models::ProxyAddr;

const DEFAULT_SCHEME: &str = "http";
const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

fn invalid(address: &str, message: impl Into<String>) -> QuoteFetchError {
    QuoteFetchError::InvalidProxy {
        address: address.to_string(),
        message: message.into(),
    }
}

/// Turn a raw candidate into a fully qualified proxy address.
///
/// `10.0.0.7:3128` becomes `http://10.0.0.7:3128`. Credentials are kept.
pub fn normalize_proxy_address(raw: &str) -> Result<ProxyAddr, QuoteFetchError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid(raw, "empty address"));
    }

    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => (DEFAULT_SCHEME.to_string(), trimmed),
    };

    if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
        return Err(invalid(raw, format!("unsupported scheme '{}'", scheme)));
    }
    if rest.contains('/') {
        return Err(invalid(raw, "unexpected path"));
    }

    let host_port = rest.rsplit_once('@').map(|(_, hp)| hp).unwrap_or(rest);
    let host = match host_port.rsplit_once(':') {
        // Bracketed IPv6 without a port
        Some((_, tail)) if tail.ends_with(']') => host_port,
        Some((host, port)) => {
            port.parse::<u16>()
                .map_err(|_| invalid(raw, format!("invalid port '{}'", port)))?;
            host
        }
        None => host_port,
    };
    if host.is_empty() {
        return Err(invalid(raw, "empty host"));
    }

    Ok(ProxyAddr::from(format!("{}://{}", scheme, rest)))
}

/// Normalize every candidate, dropping invalid ones and duplicates.
pub fn normalize_candidates<I, S>(raw: I) -> Vec<ProxyAddr>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for candidate in raw {
        match normalize_proxy_address(candidate.as_ref()) {
            Ok(addr) => {
                if seen.insert(addr.clone()) {
                    out.push(addr);
                }
            }
            Err(e) => warn!("Skipping proxy candidate: {}", e),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_scheme() {
        assert_eq!(
            normalize_proxy_address(" 10.0.0.7:3128 ").unwrap().as_ref(),
            "http://10.0.0.7:3128"
        );
    }

    #[test]
    fn test_keeps_supported_scheme_and_credentials() {
        assert_eq!(
            normalize_proxy_address("SOCKS5://user:pw@proxy.local:1080/")
                .unwrap()
                .as_ref(),
            "socks5://user:pw@proxy.local:1080"
        );
    }

    #[test]
    fn test_rejects_bad_candidates() {
        for raw in ["", "   ", "ftp://1.2.3.4:21", "http://:8080", "1.2.3.4:notaport", "http://h:1/x"] {
            assert!(
                matches!(
                    normalize_proxy_address(raw),
                    Err(QuoteFetchError::InvalidProxy { .. })
                ),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_normalize_candidates_dedupes_in_order() {
        let out = normalize_candidates([
            "10.0.0.2:80",
            "http://10.0.0.1:80",
            "bogus://x",
            "http://10.0.0.2:80",
        ]);
        let out: Vec<&str> = out.iter().map(|a| a.as_ref()).collect();
        assert_eq!(out, vec!["http://10.0.0.2:80", "http://10.0.0.1:80"]);
    }
}
