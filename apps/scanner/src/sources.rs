//! File-backed collaborators for the runner.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quotescan_engine::{ProxySupply, QuoteFetchError, QuoteSink, ScanOutcome, SymbolUniverse};

/// Non-empty lines, with `#` comments stripped.
pub fn parse_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn read_lines(path: &Path) -> Result<Vec<String>, QuoteFetchError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(parse_lines(&raw))
}

/// One ticker per line.
pub struct FileUniverse {
    path: PathBuf,
}

impl FileUniverse {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SymbolUniverse for FileUniverse {
    async fn list_symbols(&self) -> Result<Vec<String>, QuoteFetchError> {
        let symbols = read_lines(&self.path).await?;
        tracing::info!("Read {} symbols from {}", symbols.len(), self.path.display());
        Ok(symbols)
    }
}

/// One proxy address per line.
pub struct FileProxySupply {
    path: PathBuf,
}

impl FileProxySupply {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProxySupply for FileProxySupply {
    async fn load_candidates(&self) -> Result<Vec<String>, QuoteFetchError> {
        read_lines(&self.path).await
    }
}

/// Writes the whole outcome as pretty JSON.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuoteSink for JsonFileSink {
    async fn publish(&self, outcome: &ScanOutcome) -> Result<(), QuoteFetchError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(outcome)?;
        tokio::fs::write(&self.path, json).await?;
        tracing::info!(
            "Wrote {} records to {}",
            outcome.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use quotescan_engine::{QuoteRecord, ScanStatistics};

    #[test]
    fn test_parse_lines_skips_blanks_and_comments() {
        let raw = "# universe\nAAPL\n\n  msft  # big tech\n#GOOG\n";
        assert_eq!(parse_lines(raw), vec!["AAPL", "msft"]);
    }

    #[tokio::test]
    async fn test_file_universe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.txt");
        std::fs::write(&path, "AAA\nBBB\n").unwrap();

        let symbols = FileUniverse::new(&path).list_symbols().await.unwrap();
        assert_eq!(symbols, vec!["AAA", "BBB"]);
    }

    #[tokio::test]
    async fn test_missing_universe_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileUniverse::new(dir.path().join("nope.txt"))
            .list_symbols()
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteFetchError::Io(_)));
    }

    #[tokio::test]
    async fn test_json_sink_writes_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("scan.json");

        let mut records = BTreeMap::new();
        records.insert("AAA".to_string(), QuoteRecord::new("AAA"));
        let outcome = ScanOutcome {
            records,
            statistics: ScanStatistics::default(),
            denylist_candidates: BTreeSet::new(),
            chunk_reports: Vec::new(),
            proxy_metrics: Vec::new(),
        };

        JsonFileSink::new(&path).publish(&outcome).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["records"]["AAA"]["symbol"], "AAA");
        assert_eq!(written["statistics"]["total_requested"], 0);
    }
}
