// src/ingest/mod.rs
pub mod providers;
pub mod retry;
pub mod types;

pub use types::{FetchedConditions, MetricsProvider};
