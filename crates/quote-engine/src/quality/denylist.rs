//! Durable quarantine of symbols that keep returning nothing.
//!
//! The denylist is read once at the start of a run and written once at the
//! end. Symbols on it are dropped from the batch before any request is made.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::errors::QuoteFetchError;
use crate::models::SymbolBatch;

/// Backing store for the denylist.
#[async_trait]
pub trait DenylistStore: Send + Sync {
    async fn load(&self) -> Result<BTreeSet<String>, QuoteFetchError>;

    async fn save(&self, symbols: &BTreeSet<String>) -> Result<(), QuoteFetchError>;
}

/// A JSON array of symbols on disk. A missing file is an empty denylist.
#[derive(Clone, Debug)]
pub struct JsonFileDenylist {
    path: PathBuf,
}

impl JsonFileDenylist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DenylistStore for JsonFileDenylist {
    async fn load(&self) -> Result<BTreeSet<String>, QuoteFetchError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No denylist at {}, starting empty", self.path.display());
                return Ok(BTreeSet::new());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        let symbols: Vec<String> = serde_json::from_str(&raw)?;
        Ok(symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn save(&self, symbols: &BTreeSet<String>) -> Result<(), QuoteFetchError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(symbols)?;

        // Write-then-rename so a crash never leaves a truncated list
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Process-local store, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryDenylist {
    symbols: Mutex<BTreeSet<String>>,
}

impl InMemoryDenylist {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: Mutex::new(symbols.into_iter().map(Into::into).collect()),
        }
    }

    fn lock_symbols(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.symbols.lock().unwrap_or_else(|poisoned| {
            warn!("Denylist mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn contents(&self) -> BTreeSet<String> {
        self.lock_symbols().clone()
    }
}

#[async_trait]
impl DenylistStore for InMemoryDenylist {
    async fn load(&self) -> Result<BTreeSet<String>, QuoteFetchError> {
        Ok(self.contents())
    }

    async fn save(&self, symbols: &BTreeSet<String>) -> Result<(), QuoteFetchError> {
        *self.lock_symbols() = symbols.clone();
        Ok(())
    }
}

/// The denylist as loaded for one run, plus whatever the run quarantines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Denylist {
    symbols: BTreeSet<String>,
}

impl Denylist {
    pub fn new(symbols: BTreeSet<String>) -> Self {
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    /// Drop denylisted symbols from `batch`, returning the ones removed.
    pub fn filter(&self, batch: &mut SymbolBatch) -> Vec<String> {
        if self.symbols.is_empty() {
            return Vec::new();
        }
        let removed = batch.retain_partition(|s| !self.symbols.contains(s));
        if !removed.is_empty() {
            info!("Skipping {} denylisted symbols", removed.len());
        }
        removed
    }

    /// Merge newly data-less symbols in. Returns how many were new.
    pub fn quarantine<I>(&mut self, symbols: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.symbols.len();
        self.symbols.extend(symbols);
        let added = self.symbols.len() - before;
        if added > 0 {
            info!("Quarantined {} new data-less symbols", added);
        }
        added
    }
}
