//! Upstream abstractions and the HTTP implementation.
//!
//! This module contains:
//! - The `QuoteUpstream` trait, one method per fetch tier
//! - Provider-neutral raw payloads that tiers decode into
//! - Rate-limit and auth-block signature recognition
//! - The Yahoo Finance implementation

mod payload;
mod traits;

pub mod signatures;
pub mod yahoo;

pub use payload::{
    ProviderPayload, RawBar, RawHistory, RawIdentity, RawQuote, RawSummary, YieldValue,
};
pub use traits::QuoteUpstream;
pub use yahoo::YahooUpstream;
