// src/error.rs
//! Domain error types. HTTP mapping lives in `api::error`.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::ResortId;

/// Scoring configuration could not be loaded or failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read scoring config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for the expected shape.
    #[error("failed to parse scoring config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A divisor is zero, negative or not finite.
    #[error("divisor `{name}` must be a positive number (got {value})")]
    InvalidDivisor { name: &'static str, value: f64 },
    /// A breakpoint curve is malformed.
    #[error("curve `{name}` is invalid: {reason}")]
    InvalidCurve { name: &'static str, reason: String },
    /// Wind bands are not strictly ordered.
    #[error("wind bands are invalid: {0}")]
    InvalidWindBands(String),
    /// A weight lies outside 0..=1.
    #[error("weight `{name}` must be within 0..=1 (got {value})")]
    InvalidWeight { name: &'static str, value: f64 },
    /// A horizon mix does not add up to one.
    #[error("horizon mix for {days} days must sum to 1 (got {sum})")]
    InvalidHorizonMix { days: u8, sum: f64 },
    /// Any other out-of-range tunable.
    #[error("`{name}` is out of range: {reason}")]
    OutOfRange { name: &'static str, reason: String },
}

/// Rejected override operations.
#[derive(Debug, Error, PartialEq)]
pub enum OverrideError {
    /// Override depth must be strictly positive.
    #[error("depth_cm must be greater than 0 (got {0})")]
    InvalidDepth(f64),
    /// Expiry threshold below the configured minimum.
    #[error("threshold_cm must be at least {min} (got {got})")]
    InvalidThreshold { got: f64, min: f64 },
    /// An operator write landed between the pipeline's read and its tick.
    #[error("override for resort {resort_id} changed during tick (expected version {expected}, found {found})")]
    VersionConflict {
        resort_id: ResortId,
        expected: u64,
        found: u64,
    },
}

/// Reference catalog is malformed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate resort slug `{0}`")]
    DuplicateSlug(String),
    #[error("duplicate resort id {0}")]
    DuplicateId(ResortId),
    #[error("resort slug `{0}` is not URL-safe")]
    InvalidSlug(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline already running")]
    AlreadyRunning,
}
