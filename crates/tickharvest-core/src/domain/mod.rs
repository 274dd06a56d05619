//! # Domain Models
//!
//! Canonical types flowing through the acquisition pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker symbol |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`ProxyAddress`] | Normalized `host:port` |
//! | [`ProxyCandidate`] | Scraped, unvalidated proxy |
//! | [`ValidatedProxy`] | Proxy owned by the pool |
//! | [`QuotePayload`] | Parsed per-symbol quote |
//! | [`FetchTask`] | One attempt at a symbol |
//! | [`FetchResult`] | Final per-symbol outcome |

mod proxy;
mod quote;
mod symbol;
mod timestamp;

pub use proxy::{ProxyAddress, ProxyCandidate, ValidatedProxy};
pub use quote::{FetchResult, FetchTask, QuotePayload};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
