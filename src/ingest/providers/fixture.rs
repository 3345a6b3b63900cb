// src/ingest/providers/fixture.rs
//! Canned per-slug conditions read from a JSON file. Used for offline runs
//! and by the integration tests.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ingest::types::{FetchedConditions, MetricsProvider};
use crate::model::Resort;

#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    by_slug: HashMap<String, FetchedConditions>,
}

impl FixtureProvider {
    pub fn from_map(by_slug: HashMap<String, FetchedConditions>) -> Self {
        Self { by_slug }
    }

    /// `{ "<slug>": { ...conditions } }`
    pub fn from_json_str(s: &str) -> Result<Self> {
        let by_slug = serde_json::from_str(s).context("parsing fixture conditions")?;
        Ok(Self { by_slug })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture conditions {}", path.display()))?;
        Self::from_json_str(&content)
    }

    pub fn insert(&mut self, slug: impl Into<String>, conditions: FetchedConditions) {
        self.by_slug.insert(slug.into(), conditions);
    }
}

#[async_trait]
impl MetricsProvider for FixtureProvider {
    async fn fetch(&self, resort: &Resort, _now: DateTime<Utc>) -> Result<FetchedConditions> {
        self.by_slug
            .get(&resort.slug)
            .cloned()
            .ok_or_else(|| anyhow!("no fixture conditions for {}", resort.slug))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
