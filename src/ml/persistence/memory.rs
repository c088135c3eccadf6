use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};

use super::{ArtifactCache, CacheKey, ModelArtifact, ModelMetadata};
use crate::error::{ForecastError, Result};

/// In-process artifact store with the same freshness rule as the file cache.
pub struct MemoryArtifactCache {
    entries: RwLock<HashMap<String, ModelArtifact>>,
    max_age: Duration,
}

impl MemoryArtifactCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age,
        }
    }
}

impl Default for MemoryArtifactCache {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}

impl ArtifactCache for MemoryArtifactCache {
    fn has(&self, key: &CacheKey) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key.stem())
            .map(|a| a.metadata.is_fresh(Utc::now(), self.max_age))
            .unwrap_or(false)
    }

    fn load(&self, key: &CacheKey) -> Result<ModelArtifact> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&key.stem())
            .cloned()
            .ok_or_else(|| ForecastError::CorruptCacheEntry {
                key: key.to_string(),
                reason: "not stored".to_string(),
            })
    }

    fn store(&self, key: &CacheKey, artifact: &ModelArtifact) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.stem(), artifact.clone());
        Ok(())
    }

    fn list(&self) -> Vec<ModelMetadata> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<ModelMetadata> = entries.values().map(|a| a.metadata.clone()).collect();
        records.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        records
    }

    fn count(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::persistence::test_artifacts::artifact;

    #[test]
    fn test_freshness_and_overwrite() {
        let cache = MemoryArtifactCache::default();
        let key = CacheKey::new("TSLA", 5);
        assert!(!cache.has(&key));
        assert!(cache.load(&key).is_err());

        cache.store(&key, &artifact("TSLA", Utc::now() - Duration::days(8))).unwrap();
        assert!(!cache.has(&key));
        assert_eq!(cache.count(), 1);

        cache.store(&key, &artifact("TSLA", Utc::now())).unwrap();
        assert!(cache.has(&key));
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.list()[0].ticker, "TSLA");
    }
}
