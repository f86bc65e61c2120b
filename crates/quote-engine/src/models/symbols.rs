use std::collections::HashSet;
use std::sync::Arc;

/// Characters that never appear in a plain listed-equity ticker.
const NON_STANDARD_CHARS: &[char] = &['^', '=', ' ', '/', '\\', '*', '&'];

/// Suffixes listing feeds use for warrants, units and rights.
const DERIVATIVE_SUFFIXES: &[&str] = &[
    ".W", ".WS", ".WT", "-W", "-WS", "-WT", "+", ".U", ".UN", "-U", "-UN", ".R", ".RT", "-R",
    "-RT",
];

/// Trim and uppercase a raw ticker. Empty input yields `None`.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

/// Whether a normalized ticker looks like a plain listed equity.
///
/// Rejects index/FX/futures notation, a leading `$`, and warrant, unit and
/// rights suffixes. Five-letter all-alpha tickers ending in W, U or R follow
/// the Nasdaq fifth-letter convention for the same instruments.
pub fn is_standard_symbol(symbol: &str) -> bool {
    if symbol.is_empty() || symbol.starts_with('$') {
        return false;
    }
    if symbol.contains(NON_STANDARD_CHARS) {
        return false;
    }
    if DERIVATIVE_SUFFIXES.iter().any(|s| symbol.ends_with(s)) {
        return false;
    }
    if symbol.len() == 5
        && symbol.chars().all(|c| c.is_ascii_alphabetic())
        && symbol.ends_with(['W', 'U', 'R'])
    {
        return false;
    }
    true
}

/// An ordered, deduplicated, uppercase sequence of tickers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolBatch {
    symbols: Vec<String>,
}

impl SymbolBatch {
    /// Normalize and deduplicate, keeping first-seen order.
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let symbols = raw
            .into_iter()
            .filter_map(|s| normalize_symbol(s.as_ref()))
            .filter(|s| seen.insert(s.clone()))
            .collect();
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Split off symbols that fail `keep`, returning the removed ones.
    pub fn retain_partition<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let (kept, removed): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.symbols).into_iter().partition(|s| keep(s));
        self.symbols = kept;
        removed
    }

    /// Partition into fixed-size chunks. The last chunk may be shorter.
    pub fn chunks(&self, size: usize) -> Vec<Chunk> {
        self.symbols
            .chunks(size.max(1))
            .enumerate()
            .map(|(index, symbols)| Chunk {
                index,
                symbols: Arc::from(symbols.to_vec()),
            })
            .collect()
    }
}

/// An immutable slice of the universe processed as one scheduling unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub symbols: Arc<[String]>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
