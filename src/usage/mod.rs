//! Usage monitoring — fetch and decode `ccusage blocks` JSON output.
//!
//! This module invokes the external `ccusage` CLI, validates (and when
//! possible repairs) its stdout, and decodes it into a usage snapshot.

pub mod fetcher;
pub mod types;
pub mod validate;

pub use fetcher::UsageFetcher;
pub use types::{Block, BurnRate, Projection, TokenCounts, TokenLimitStatus, UsageSnapshot};
