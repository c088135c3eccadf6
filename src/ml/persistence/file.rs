use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ArtifactCache, CacheKey, ModelArtifact, ModelMetadata};
use crate::error::{ForecastError, Result};

const MODEL_FILE: &str = "model.json";
const SCALER_FILE: &str = "scaler.json";
const METADATA_FILE: &str = "metadata.json";

/// `metadata.json` on disk: the metadata record plus digests of its siblings.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    #[serde(flatten)]
    metadata: ModelMetadata,
    model_sha256: String,
    scaler_sha256: String,
}

/// Directory-per-key artifact store.
///
/// Layout: `<root>/<SYMBOL>_<h>d/{model,scaler,metadata}.json`. A store
/// writes all three files into a hidden staging directory and then swaps it
/// in with renames, so a key directory always holds one complete triple.
pub struct FileArtifactCache {
    root: PathBuf,
    max_age: Duration,
    write_lock: Mutex<()>,
}

impl FileArtifactCache {
    pub fn new(root: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            max_age,
            write_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.stem())
    }

    fn read_metadata(dir: &Path) -> Result<StoredMetadata> {
        let raw = fs::read(dir.join(METADATA_FILE))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn key_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !n.starts_with('.'))
                    .unwrap_or(false)
            })
            .collect();
        dirs.sort();
        dirs
    }

    fn write_staging(&self, staging: &Path, artifact: &ModelArtifact) -> Result<()> {
        fs::create_dir_all(staging)?;

        let model = serde_json::to_vec(&artifact.predictor)?;
        let scaler = serde_json::to_vec(&artifact.scaler)?;
        fs::write(staging.join(MODEL_FILE), &model)?;
        fs::write(staging.join(SCALER_FILE), &scaler)?;

        let stored = StoredMetadata {
            metadata: artifact.metadata.clone(),
            model_sha256: sha256_hex(&model),
            scaler_sha256: sha256_hex(&scaler),
        };
        fs::write(staging.join(METADATA_FILE), serde_json::to_vec_pretty(&stored)?)?;
        Ok(())
    }

    fn swap_into_place(&self, staging: &Path, target: &Path) -> Result<()> {
        if target.exists() {
            let retired = self.root.join(format!(".retired-{}", Uuid::new_v4()));
            fs::rename(target, &retired)?;
            if let Err(e) = fs::rename(staging, target) {
                // put the previous artifact back rather than leave the key empty
                fs::rename(&retired, target).ok();
                return Err(e.into());
            }
            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!("Could not remove retired artifact {}: {}", retired.display(), e);
            }
        } else {
            fs::rename(staging, target)?;
        }
        Ok(())
    }
}

impl ArtifactCache for FileArtifactCache {
    fn has(&self, key: &CacheKey) -> bool {
        let dir = self.key_dir(key);
        match Self::read_metadata(&dir) {
            Ok(stored) => {
                let fresh = stored.metadata.is_fresh(Utc::now(), self.max_age);
                fresh && dir.join(MODEL_FILE).is_file() && dir.join(SCALER_FILE).is_file()
            }
            Err(e) => {
                debug!("No usable cache entry for {}: {}", key, e);
                false
            }
        }
    }

    fn load(&self, key: &CacheKey) -> Result<ModelArtifact> {
        let dir = self.key_dir(key);
        let corrupt = |reason: String| ForecastError::CorruptCacheEntry {
            key: key.to_string(),
            reason,
        };

        let stored = Self::read_metadata(&dir).map_err(|e| corrupt(e.to_string()))?;
        let model = fs::read(dir.join(MODEL_FILE)).map_err(|e| corrupt(e.to_string()))?;
        let scaler = fs::read(dir.join(SCALER_FILE)).map_err(|e| corrupt(e.to_string()))?;

        if sha256_hex(&model) != stored.model_sha256 {
            return Err(corrupt("model digest mismatch".to_string()));
        }
        if sha256_hex(&scaler) != stored.scaler_sha256 {
            return Err(corrupt("scaler digest mismatch".to_string()));
        }

        let artifact = ModelArtifact {
            predictor: serde_json::from_slice(&model).map_err(|e| corrupt(e.to_string()))?,
            scaler: serde_json::from_slice(&scaler).map_err(|e| corrupt(e.to_string()))?,
            metadata: stored.metadata,
        };
        debug!("Loaded cached model {} from {}", key, dir.display());
        Ok(artifact)
    }

    fn store(&self, key: &CacheKey, artifact: &ModelArtifact) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::create_dir_all(&self.root)?;

        let staging = self.root.join(format!(".staging-{}", Uuid::new_v4()));
        let target = self.key_dir(key);
        let result = self
            .write_staging(&staging, artifact)
            .and_then(|_| self.swap_into_place(&staging, &target));

        if result.is_err() && staging.exists() {
            fs::remove_dir_all(&staging).ok();
        }
        result?;

        info!("Model saved to {}", target.display());
        Ok(())
    }

    fn list(&self) -> Vec<ModelMetadata> {
        self.key_dirs()
            .iter()
            .filter_map(|dir| Self::read_metadata(dir).ok())
            .map(|stored| stored.metadata)
            .collect()
    }

    fn count(&self) -> usize {
        self.key_dirs()
            .iter()
            .filter(|dir| dir.join(METADATA_FILE).is_file())
            .count()
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::persistence::test_artifacts::artifact;
    use crate::ml::{SequencePredictor, StandardScaler};
    use ndarray::{array, Array2};

    fn temp_cache() -> FileArtifactCache {
        let root = std::env::temp_dir().join(format!("forecaster-cache-{}", Uuid::new_v4()));
        FileArtifactCache::new(root, Duration::days(7))
    }

    #[test]
    fn test_store_then_load_round_trip() {
        let cache = temp_cache();
        let key = CacheKey::new("AAPL", 5);
        let original = artifact("AAPL", Utc::now());

        assert!(!cache.has(&key));
        cache.store(&key, &original).unwrap();
        assert!(cache.has(&key));

        let loaded = cache.load(&key).unwrap();
        assert_eq!(loaded.metadata, original.metadata);
        assert_eq!(loaded.metadata.feature_names, vec!["Close", "RSI"]);

        let probe = array![[3.0, 4.0]];
        assert_eq!(
            loaded.scaler.transform(probe.view()).unwrap(),
            original.scaler.transform(probe.view()).unwrap()
        );
        let window = Array2::from_elem((3, 2), 0.25);
        assert_eq!(
            loaded.predictor.infer(window.view()).unwrap(),
            original.predictor.infer(window.view()).unwrap()
        );

        fs::remove_dir_all(cache.root()).ok();
    }

    #[test]
    fn test_store_replaces_previous_artifact() {
        let cache = temp_cache();
        let key = CacheKey::new("MSFT", 5);
        cache.store(&key, &artifact("MSFT", Utc::now() - Duration::days(3))).unwrap();

        let mut newer = artifact("MSFT", Utc::now());
        newer.metadata.accuracy = 0.9;
        cache.store(&key, &newer).unwrap();

        assert_eq!(cache.count(), 1);
        assert_eq!(cache.load(&key).unwrap().metadata.accuracy, 0.9);
        // no staging or retired directories left behind
        let leftovers = fs::read_dir(cache.root()).unwrap().count();
        assert_eq!(leftovers, 1);

        fs::remove_dir_all(cache.root()).ok();
    }

    #[test]
    fn test_stale_and_corrupt_entries_are_misses() {
        let cache = temp_cache();
        let stale = CacheKey::new("OLD", 5);
        cache.store(&stale, &artifact("OLD", Utc::now() - Duration::days(8))).unwrap();
        assert!(!cache.has(&stale));

        let broken = CacheKey::new("BROKEN", 5);
        cache.store(&broken, &artifact("BROKEN", Utc::now())).unwrap();
        fs::write(cache.key_dir(&broken).join(METADATA_FILE), b"{\"ticker\": \"BROKEN\"}").unwrap();
        assert!(!cache.has(&broken));
        assert!(matches!(
            cache.load(&broken),
            Err(ForecastError::CorruptCacheEntry { .. })
        ));

        // stale entries are still listed, the unparseable one is skipped
        let listed = cache.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].ticker, "OLD");

        fs::remove_dir_all(cache.root()).ok();
    }

    #[test]
    fn test_tampered_scaler_fails_digest() {
        let cache = temp_cache();
        let key = CacheKey::new("^GSPC", 5);
        cache.store(&key, &artifact("^GSPC", Utc::now())).unwrap();
        assert!(cache.root().join("_GSPC_5d").is_dir());

        let scaler = StandardScaler::fit(array![[1.0, 2.0], [5.0, 9.0]].view()).unwrap();
        fs::write(
            cache.key_dir(&key).join(SCALER_FILE),
            serde_json::to_vec(&scaler).unwrap(),
        )
        .unwrap();

        match cache.load(&key) {
            Err(ForecastError::CorruptCacheEntry { key, reason }) => {
                assert_eq!(key, "_GSPC_5d");
                assert!(reason.contains("scaler"));
            }
            other => panic!("expected corrupt entry, got {:?}", other.map(|a| a.metadata)),
        }

        fs::remove_dir_all(cache.root()).ok();
    }

    #[test]
    fn test_missing_root_is_empty() {
        let cache = temp_cache();
        assert_eq!(cache.count(), 0);
        assert!(cache.list().is_empty());
        assert!(!cache.has(&CacheKey::new("AAPL", 5)));
    }
}
