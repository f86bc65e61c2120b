//! Quote engine models
//!
//! - `types` - Type aliases for network identities
//! - `quote` - Normalized quote record, merge law, core field set
//! - `symbols` - Symbol normalization, pattern filter, batches and chunks
//! - `stats` - Scan statistics and field quality

mod quote;
mod stats;
mod symbols;
mod types;

pub use quote::{CoreField, FetchTier, QuoteRecord};
pub use stats::{FieldQuality, QualitySummary, ScanStatistics};
pub use symbols::{is_standard_symbol, normalize_symbol, Chunk, SymbolBatch};
pub use types::{identity_label, ProxyAddr, DIRECT_IDENTITY};
