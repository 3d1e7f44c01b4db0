//! nastro-middleware
//!
//! Wrappers and policies applied around [`HistoricalProvider`]
//! implementations:
//!
//! - [`RateLimited`]: enforces the provider's declared request budget with a
//!   token-bucket (requests per window plus a minimum inter-request delay).
//! - [`RetryPolicy`]: bounded exponential backoff applied to transient
//!   failures only; permanent errors surface immediately.
//!
//! [`HistoricalProvider`]: nastro_core::HistoricalProvider
#![warn(missing_docs)]

mod rate_limit;
mod retry;

pub use rate_limit::RateLimited;
pub use retry::{RetryPolicy, jitter_ms};
