//! Result-set quality gating.
//!
//! - `validator` - per-record sanitation applied after mapping
//! - `denylist` - durable quarantine of data-less symbols
//!
//! [`QualityEvaluator`] turns the accepted record map into completeness and
//! null/zero figures and flags whether the run met its targets. Missing a
//! target never blocks output.

mod denylist;
mod validator;

pub use denylist::{Denylist, DenylistStore, InMemoryDenylist, JsonFileDenylist};
pub use validator::{RecordValidator, ValidationIssue, ValidatorConfig};

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::models::{CoreField, FieldQuality, QualitySummary, QuoteRecord, ScanStatistics};

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Null/zero breakdown over [`CoreField::ALL`] for every record.
pub fn field_quality<'a, I>(records: I) -> (QualitySummary, Vec<FieldQuality>)
where
    I: IntoIterator<Item = &'a QuoteRecord>,
{
    let mut nulls = [0usize; CoreField::ALL.len()];
    let mut zeros = [0usize; CoreField::ALL.len()];
    let mut count = 0usize;

    for record in records {
        count += 1;
        for (i, field) in CoreField::ALL.iter().enumerate() {
            match field.value(record) {
                None => nulls[i] += 1,
                Some(v) if v == Decimal::ZERO => zeros[i] += 1,
                Some(_) => {}
            }
        }
    }

    let fields: Vec<FieldQuality> = CoreField::ALL
        .iter()
        .enumerate()
        .map(|(i, field)| FieldQuality {
            field: *field,
            nulls: nulls[i],
            zeros: zeros[i],
            null_pct: pct(nulls[i], count),
            zero_pct: pct(zeros[i], count),
            null_or_zero_pct: pct(nulls[i] + zeros[i], count),
        })
        .collect();

    let samples = count * CoreField::ALL.len();
    let total_nulls: usize = nulls.iter().sum();
    let total_zeros: usize = zeros.iter().sum();
    let summary = QualitySummary {
        samples,
        nulls: total_nulls,
        zeros: total_zeros,
        null_pct: pct(total_nulls, samples),
        zero_pct: pct(total_zeros, samples),
        null_or_zero_pct: pct(total_nulls + total_zeros, samples),
    };

    (summary, fields)
}

/// Computes [`ScanStatistics`] for a finished run.
#[derive(Clone, Debug)]
pub struct QualityEvaluator {
    required_completeness: f64,
    runtime_target: Option<Duration>,
}

impl QualityEvaluator {
    pub fn new(required_completeness: f64, runtime_target: Option<Duration>) -> Self {
        Self {
            required_completeness,
            runtime_target,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.required_completeness, config.runtime_target)
    }

    /// Completeness, quality and SLO flags for the accepted records.
    ///
    /// `total_requested` counts every scheduled symbol, including ones later
    /// removed by the quote-type filter. Run-level counters (chunks,
    /// rotations, filters) are left at zero for the caller to fill in.
    pub fn evaluate(
        &self,
        records: &BTreeMap<String, QuoteRecord>,
        total_requested: usize,
        elapsed: Duration,
    ) -> ScanStatistics {
        let complete_count = records.values().filter(|r| r.is_complete()).count();
        let partial_count = records.len() - complete_count;

        let completeness_ratio = if total_requested == 0 {
            0.0
        } else {
            (complete_count as f64 / total_requested as f64).clamp(0.0, 1.0)
        };

        let elapsed_secs = elapsed.as_secs_f64();
        let rate_per_second = if elapsed_secs > 0.0 {
            total_requested as f64 / elapsed_secs
        } else {
            0.0
        };

        let (quality, fields) = field_quality(records.values());

        ScanStatistics {
            total_requested,
            complete_count,
            partial_count,
            failed_count: total_requested.saturating_sub(complete_count),
            elapsed_secs,
            rate_per_second,
            completeness_ratio,
            met_completeness_target: completeness_ratio >= self.required_completeness,
            met_runtime_target: self
                .runtime_target
                .map(|target| elapsed <= target)
                .unwrap_or(true),
            quality,
            fields,
            ..Default::default()
        }
    }
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
