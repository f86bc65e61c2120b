//! Yahoo Finance upstream.
//!
//! Tier endpoints:
//! - Bulk: v7 `quote` with a comma-separated symbol list
//! - Summary: v10 `quoteSummary` with the price, summaryDetail and
//!   defaultKeyStatistics modules
//! - History: v8 `chart` with a daily interval
//!
//! Sessions are authenticated with a cookie from `fc.yahoo.com` followed by a
//! crumb from `getcrumb`; both ride along on every later request.

mod models;

use async_trait::async_trait;
use reqwest::header;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::QuoteFetchError;
use crate::provider::signatures::check_response;
use crate::provider::{QuoteUpstream, RawHistory, RawQuote, RawSummary};
use crate::session::{FetchSession, SessionAuth};

use models::{YahooChartResponse, YahooQuoteResponse, YahooQuoteSummaryResponse};

const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_MODULES: &str = "price,summaryDetail,defaultKeyStatistics";

/// Yahoo Finance implementation of [`QuoteUpstream`].
#[derive(Clone, Debug, Default)]
pub struct YahooUpstream;

impl YahooUpstream {
    pub fn new() -> Self {
        Self
    }

    /// GET `url`, returning the body once status and signatures check out.
    async fn get_text(
        &self,
        session: &FetchSession,
        url: &str,
        symbol: Option<&str>,
    ) -> Result<String, QuoteFetchError> {
        let identity = session.identity_label();

        let mut request = session.client().get(url);
        if let Some(auth) = session.auth() {
            request = request.header(header::COOKIE, &auth.cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, &identity))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, &identity))?;

        check_response(status, &body, &identity, symbol)?;
        Ok(body)
    }

    async fn fetch_cookie(&self, session: &FetchSession) -> Result<String, QuoteFetchError> {
        // fc.yahoo.com answers 404 but still sets the cookie
        let response = session
            .client()
            .get(COOKIE_URL)
            .send()
            .await
            .map_err(|e| transport_error(e, &session.identity_label()))?;

        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| QuoteFetchError::Malformed {
                message: "Failed to parse Yahoo cookie".to_string(),
            })
    }
}

/// Map a reqwest failure, singling out timeouts.
fn transport_error(error: reqwest::Error, identity: &str) -> QuoteFetchError {
    if error.is_timeout() {
        QuoteFetchError::Timeout {
            identity: identity.to_string(),
        }
    } else {
        QuoteFetchError::Network(error)
    }
}

fn malformed(context: &str, error: serde_json::Error) -> QuoteFetchError {
    QuoteFetchError::Malformed {
        message: format!("{}: {}", context, error),
    }
}

fn with_crumb(url: String, session: &FetchSession) -> String {
    match session.auth() {
        Some(auth) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}crumb={}", url, sep, encode(&auth.crumb))
        }
        None => url,
    }
}

fn quote_url(symbols: &[String]) -> String {
    format!("{}?symbols={}", QUOTE_URL, encode(&symbols.join(",")))
}

fn summary_url(symbol: &str) -> String {
    format!("{}/{}?modules={}", SUMMARY_URL, encode(symbol), SUMMARY_MODULES)
}

fn chart_url(symbol: &str, days: u32) -> String {
    format!("{}/{}?range={}d&interval=1d", CHART_URL, encode(symbol), days)
}

/// Decode a crumb body. Crumbs are short opaque tokens; HTML means a block page.
fn parse_crumb(body: &str) -> Result<String, QuoteFetchError> {
    let crumb = body.trim();
    if crumb.is_empty() || crumb.contains('<') || crumb.contains(char::is_whitespace) {
        return Err(QuoteFetchError::Malformed {
            message: "Failed to read Yahoo crumb".to_string(),
        });
    }
    Ok(crumb.to_string())
}

fn parse_quote_body(body: &str) -> Result<Vec<RawQuote>, QuoteFetchError> {
    let data: YahooQuoteResponse =
        serde_json::from_str(body).map_err(|e| malformed("quote response", e))?;

    match (data.quote_response.result, data.quote_response.error) {
        (Some(result), _) => Ok(result.into_iter().map(RawQuote::from).collect()),
        (None, Some(err)) if err.is_not_found() => Ok(Vec::new()),
        (None, Some(err)) => Err(QuoteFetchError::Malformed {
            message: format!("{}: {}", err.code, err.description),
        }),
        (None, None) => Ok(Vec::new()),
    }
}

fn parse_summary_body(symbol: &str, body: &str) -> Result<RawSummary, QuoteFetchError> {
    let data: YahooQuoteSummaryResponse =
        serde_json::from_str(body).map_err(|e| malformed("quoteSummary response", e))?;

    if let Some(err) = data.quote_summary.error {
        if err.is_not_found() {
            return Err(QuoteFetchError::SymbolNotFound(symbol.to_string()));
        }
        return Err(QuoteFetchError::Malformed {
            message: format!("{}: {}", err.code, err.description),
        });
    }

    data.quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.into_raw(symbol))
        .ok_or_else(|| QuoteFetchError::NoData(symbol.to_string()))
}

fn parse_chart_body(symbol: &str, body: &str) -> Result<RawHistory, QuoteFetchError> {
    let data: YahooChartResponse =
        serde_json::from_str(body).map_err(|e| malformed("chart response", e))?;

    if let Some(err) = data.chart.error {
        if err.is_not_found() {
            return Err(QuoteFetchError::SymbolNotFound(symbol.to_string()));
        }
        return Err(QuoteFetchError::Malformed {
            message: format!("{}: {}", err.code, err.description),
        });
    }

    let history = data
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.into_raw(symbol))
        .ok_or_else(|| QuoteFetchError::NoData(symbol.to_string()))?;

    if history.bars.is_empty() {
        return Err(QuoteFetchError::NoData(symbol.to_string()));
    }
    Ok(history)
}

#[async_trait]
impl QuoteUpstream for YahooUpstream {
    fn id(&self) -> &'static str {
        "YAHOO"
    }

    async fn warm_up(
        &self,
        session: &FetchSession,
    ) -> Result<Option<SessionAuth>, QuoteFetchError> {
        let cookie = self.fetch_cookie(session).await?;

        let identity = session.identity_label();
        let response = session
            .client()
            .get(CRUMB_URL)
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| transport_error(e, &identity))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, &identity))?;
        check_response(status, &body, &identity, None)?;

        let crumb = parse_crumb(&body)?;
        debug!("Obtained Yahoo crumb via {}", identity);
        Ok(Some(SessionAuth { cookie, crumb }))
    }

    async fn bulk_quotes(
        &self,
        session: &FetchSession,
        symbols: &[String],
    ) -> Result<Vec<RawQuote>, QuoteFetchError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "Fetching {} bulk quotes from Yahoo via {}",
            symbols.len(),
            session.identity_label()
        );

        let url = with_crumb(quote_url(symbols), session);
        let body = self.get_text(session, &url, None).await?;
        let quotes = parse_quote_body(&body)?;

        if quotes.len() < symbols.len() {
            debug!(
                "Yahoo returned {}/{} bulk quotes",
                quotes.len(),
                symbols.len()
            );
        }
        Ok(quotes)
    }

    async fn symbol_summary(
        &self,
        session: &FetchSession,
        symbol: &str,
    ) -> Result<RawSummary, QuoteFetchError> {
        debug!("Fetching quoteSummary for {} from Yahoo", symbol);
        let url = with_crumb(summary_url(symbol), session);
        let body = self.get_text(session, &url, Some(symbol)).await?;
        parse_summary_body(symbol, &body)
    }

    async fn daily_history(
        &self,
        session: &FetchSession,
        symbol: &str,
        days: u32,
    ) -> Result<RawHistory, QuoteFetchError> {
        debug!("Fetching {}d chart for {} from Yahoo", days, symbol);
        let url = chart_url(symbol, days);
        let body = self.get_text(session, &url, Some(symbol)).await?;
        parse_chart_body(symbol, &body).map_err(|e| {
            if matches!(e, QuoteFetchError::Malformed { .. }) {
                warn!("Unparseable chart for {}: {}", symbol, e);
            }
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let symbols = vec!["AAPL".to_string(), "BRK-B".to_string()];
        assert_eq!(
            quote_url(&symbols),
            "https://query1.finance.yahoo.com/v7/finance/quote?symbols=AAPL%2CBRK-B"
        );
        assert_eq!(
            summary_url("BF.B"),
            "https://query2.finance.yahoo.com/v10/finance/quoteSummary/BF.B?modules=price,summaryDetail,defaultKeyStatistics"
        );
        assert_eq!(
            chart_url("MSFT", 5),
            "https://query1.finance.yahoo.com/v8/finance/chart/MSFT?range=5d&interval=1d"
        );
    }

    #[test]
    fn test_parse_crumb() {
        assert_eq!(parse_crumb("abcD3f.g\n").unwrap(), "abcD3f.g");
        assert!(parse_crumb("").is_err());
        assert!(parse_crumb("<html>blocked</html>").is_err());
    }

    #[test]
    fn test_parse_quote_body() {
        let body = r#"{"quoteResponse":{"result":[{"symbol":"AAA","regularMarketPrice":10.0}],"error":null}}"#;
        let quotes = parse_quote_body(body).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].identity.symbol, "AAA");
        assert_eq!(quotes[0].price, Some(10.0));
    }

    #[test]
    fn test_unparseable_body_is_transient() {
        let err = parse_quote_body("not json").unwrap_err();
        assert!(matches!(err, QuoteFetchError::Malformed { .. }));
        assert_eq!(err.retry_class(), crate::errors::RetryClass::Transient);
    }

    #[test]
    fn test_parse_summary_not_found() {
        let body = r#"{"quoteSummary":{"result":null,"error":{"code":"Not Found","description":"Quote not found for ticker symbol: ZZZZ"}}}"#;
        let err = parse_summary_body("ZZZZ", body).unwrap_err();
        assert!(matches!(err, QuoteFetchError::SymbolNotFound(ref s) if s == "ZZZZ"));
    }

    #[test]
    fn test_parse_chart_without_bars_is_no_data() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"CCC"},"indicators":{"quote":[{}]}}],"error":null}}"#;
        let err = parse_chart_body("CCC", body).unwrap_err();
        assert!(matches!(err, QuoteFetchError::NoData(_)));
    }

    #[test]
    fn test_parse_chart_delisted() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart_body("OLDCO", body).unwrap_err();
        assert!(matches!(err, QuoteFetchError::SymbolNotFound(_)));
    }
}
