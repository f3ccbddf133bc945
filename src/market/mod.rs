//! Price Snapshot
//!
//! Immutable, versioned views of fertilizer and commodity prices. The
//! optimizer only ever reads a single snapshot per run, so every number in
//! a result traces back to one set of quotes.

mod cache;
pub mod feed;
mod snapshot;

pub use cache::PriceCache;
pub use feed::run_price_publisher;
pub use snapshot::{get_price, CommodityPrice, FertilizerQuote, PriceKey, PriceSnapshot};

use thiserror::Error;

/// Market data errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("no price for '{item}' in snapshot {snapshot_id}")]
    PriceNotFound { snapshot_id: String, item: String },

    #[error("price snapshot {snapshot_id} not found")]
    SnapshotNotFound { snapshot_id: String },

    #[error("price snapshot {snapshot_id} already published")]
    DuplicateSnapshot { snapshot_id: String },

    #[error("invalid quote '{item}' in snapshot {snapshot_id}: {reason}")]
    InvalidQuote {
        snapshot_id: String,
        item: String,
        reason: String,
    },
}
