//! Incremental delivery: what has been sent, and what must never be sent twice.

mod dedup;
mod tracker;

pub use dedup::DedupGuard;
pub use tracker::DeliveryTracker;
