//! Record sanitation.
//!
//! Mapped records are checked field by field. Implausible values are coerced
//! to null rather than rejecting the record:
//! - Negative price, volume, average volume or market cap
//! - Price or 52-week bound above a sanity ceiling
//! - A 52-week range whose low exceeds its high

use log::debug;
use rust_decimal::Decimal;

use crate::models::QuoteRecord;

/// One coerced field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

/// Validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Null out negative prices, volumes and market caps.
    pub coerce_negative: bool,
    /// Prices above this are treated as corrupt.
    pub max_price: Option<Decimal>,
    /// Null both bounds of an inverted 52-week range.
    pub coerce_inverted_range: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            coerce_negative: true,
            max_price: Some(Decimal::from(1_000_000_000i64)), // 1 billion as sanity check
            coerce_inverted_range: true,
        }
    }
}

/// Coerces implausible numeric fields of a [`QuoteRecord`] to null.
#[derive(Clone, Debug, Default)]
pub struct RecordValidator {
    config: ValidatorConfig,
}

impl RecordValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Sanitize in place, returning what was coerced.
    pub fn sanitize(&self, record: &mut QuoteRecord) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.config.coerce_negative {
            Self::null_negative("price", &mut record.price, &mut issues);
            Self::null_negative("previous_close", &mut record.previous_close, &mut issues);
            Self::null_negative("volume", &mut record.volume, &mut issues);
            Self::null_negative("average_volume", &mut record.average_volume, &mut issues);
            Self::null_negative("market_cap", &mut record.market_cap, &mut issues);
            Self::null_negative(
                "shares_outstanding",
                &mut record.shares_outstanding,
                &mut issues,
            );
        }

        if let Some(max) = self.config.max_price {
            Self::null_above("price", &mut record.price, max, &mut issues);
            Self::null_above("week_52_high", &mut record.week_52_high, max, &mut issues);
            Self::null_above("week_52_low", &mut record.week_52_low, max, &mut issues);
        }

        if self.config.coerce_inverted_range {
            if let (Some(low), Some(high)) = (record.week_52_low, record.week_52_high) {
                if low > high {
                    issues.push(ValidationIssue {
                        field: "week_52_range",
                        message: format!("52-week low {} above high {}", low, high),
                    });
                    record.week_52_low = None;
                    record.week_52_high = None;
                }
            }
        }

        for issue in &issues {
            debug!("Coerced {} for {}: {}", issue.field, record.symbol, issue.message);
        }
        issues
    }

    fn null_negative(
        field: &'static str,
        value: &mut Option<Decimal>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        if let Some(v) = *value {
            if v < Decimal::ZERO {
                issues.push(ValidationIssue {
                    field,
                    message: format!("negative value {}", v),
                });
                *value = None;
            }
        }
    }

    fn null_above(
        field: &'static str,
        value: &mut Option<Decimal>,
        max: Decimal,
        issues: &mut Vec<ValidationIssue>,
    ) {
        if let Some(v) = *value {
            if v > max {
                issues.push(ValidationIssue {
                    field,
                    message: format!("{} exceeds maximum {}", v, max),
                });
                *value = None;
            }
        }
    }
}
