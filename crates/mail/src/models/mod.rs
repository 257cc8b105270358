//! Domain models for mail resources
//!
//! Typed summaries and details built from the provider's wire responses,
//! replacing ad-hoc key lookups with explicit required/optional fields.

mod detail;
mod summary;

pub use detail::{DraftDetail, MessageDetail};
pub use summary::{DraftSummary, MessageSummary, ThreadSummary};
