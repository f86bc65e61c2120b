use serde::{Deserialize, Serialize};

use super::quote::CoreField;

/// Null/zero breakdown for one core field across all accepted records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldQuality {
    pub field: CoreField,
    pub nulls: usize,
    pub zeros: usize,
    pub null_pct: f64,
    pub zero_pct: f64,
    pub null_or_zero_pct: f64,
}

/// Aggregate data quality over every core field of every accepted record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    /// Number of field slots inspected (records × core fields).
    pub samples: usize,
    pub nulls: usize,
    pub zeros: usize,
    pub null_pct: f64,
    pub zero_pct: f64,
    pub null_or_zero_pct: f64,
}

/// Aggregate counters for one scan. Computed once at the end of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// Symbols scheduled for fetching (after denylist and pattern filtering).
    pub total_requested: usize,
    /// Records with price, volume and market cap.
    pub complete_count: usize,
    /// Records accepted but missing at least one completeness field.
    pub partial_count: usize,
    /// Requested symbols without a complete record.
    pub failed_count: usize,
    /// Symbols removed because their quote type is not allowed.
    pub non_equity_count: usize,
    /// Input symbols skipped because they are on the denylist.
    pub denylisted_skipped: usize,
    /// Input symbols skipped for non-standard ticker patterns.
    pub pattern_filtered: usize,
    /// Chunks that hit at least one rate-limit or auth-block signature.
    pub rate_limited_chunks: usize,
    /// Chunks that ran out of attempts.
    pub exhausted_chunks: usize,
    /// Times a worker switched to a different proxy identity after a failure.
    pub proxy_rotations: usize,
    /// Records whose volume is the average volume.
    pub volume_substitutions: usize,
    /// Symbols newly quarantined by this run.
    pub newly_denylisted: usize,
    pub elapsed_secs: f64,
    /// Requested symbols per second.
    pub rate_per_second: f64,
    /// `complete_count / total_requested`, 0 when nothing was requested.
    pub completeness_ratio: f64,
    pub met_completeness_target: bool,
    pub met_runtime_target: bool,
    /// The run deadline fired before all chunks finished.
    pub cancelled: bool,
    pub quality: QualitySummary,
    pub fields: Vec<FieldQuality>,
}

impl ScanStatistics {
    /// The run met every configured target.
    pub fn met_targets(&self) -> bool {
        self.met_completeness_target && self.met_runtime_target
    }

    /// One-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{}/{} complete ({:.1}%), {} failed, {} rate-limited chunks, {} rotations, {:.1}s ({:.1}/s)",
            self.complete_count,
            self.total_requested,
            self.completeness_ratio * 100.0,
            self.failed_count,
            self.rate_limited_chunks,
            self.proxy_rotations,
            self.elapsed_secs,
            self.rate_per_second
        )
    }
}
