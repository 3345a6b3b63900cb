// src/ingest/providers/mod.rs
pub mod fixture;
pub mod open_meteo;
pub mod synoptic;

pub use fixture::FixtureProvider;
pub use open_meteo::OpenMeteoProvider;
pub use synoptic::{StationEnrichedProvider, StationMap, StationSource, SynopticClient};
