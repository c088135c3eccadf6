pub mod file;
#[cfg(test)]
pub mod memory;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DualHeadPredictor, StandardScaler};
use crate::error::Result;

pub use file::FileArtifactCache;
#[cfg(test)]
pub use memory::MemoryArtifactCache;

/// Version of the persisted metadata layout. Entries with any other version
/// are reported as not cached.
pub const SCHEMA_VERSION: u32 = 1;

/// Cache key: one artifact per symbol and horizon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub horizon: usize,
}

impl CacheKey {
    pub fn new(symbol: impl Into<String>, horizon: usize) -> Self {
        Self {
            symbol: symbol.into(),
            horizon,
        }
    }

    /// Symbol with path-unsafe characters replaced, e.g. `^GSPC` -> `_GSPC`.
    pub fn sanitized_symbol(&self) -> String {
        self.symbol.replace(['/', '\\', '^'], "_")
    }

    /// Storage stem, e.g. `AAPL_5d`.
    pub fn stem(&self) -> String {
        format!("{}_{}d", self.sanitized_symbol(), self.horizon)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stem())
    }
}

/// Training metadata stored next to every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub schema_version: u32,
    pub ticker: String,
    pub horizon: usize,
    pub sequence_length: usize,
    pub feature_names: Vec<String>,
    pub n_features: usize,
    /// Validation accuracy as a fraction in `[0, 1]`.
    pub accuracy: f64,
    pub auc: f64,
    /// ISO-8601 timestamp; kept as text so an unparseable value reads as stale
    /// instead of failing the whole record.
    pub trained_at: String,
    pub data_points: usize,
    pub epochs_trained: usize,
}

impl ModelMetadata {
    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.trained_at)
    }

    /// True when the schema matches and `trained_at` parses and lies within
    /// `max_age` of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if self.schema_version != SCHEMA_VERSION {
            return false;
        }
        match self.trained_at() {
            Some(trained_at) => now - trained_at < max_age,
            None => false,
        }
    }
}

/// Accepts RFC 3339 or a naive ISO-8601 timestamp (read as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A trained predictor together with the scaler and metadata it was trained
/// with. Stored and replaced as a unit.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub predictor: DualHeadPredictor,
    pub scaler: StandardScaler,
    pub metadata: ModelMetadata,
}

/// Storage for trained artifacts keyed by symbol and horizon.
pub trait ArtifactCache: Send + Sync {
    /// True only for a stored, readable and fresh artifact. Never errors:
    /// anything unreadable counts as a miss.
    fn has(&self, key: &CacheKey) -> bool;

    fn load(&self, key: &CacheKey) -> Result<ModelArtifact>;

    /// Replaces any artifact under `key` as a whole.
    fn store(&self, key: &CacheKey, artifact: &ModelArtifact) -> Result<()>;

    /// Every parseable metadata record, stale ones included.
    fn list(&self) -> Vec<ModelMetadata>;

    fn count(&self) -> usize;
}
