use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{Duration, Utc};
use ndarray::Axis;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::postprocess::{interpret, round_to, target_price};
use crate::config::{ModelSettings, TrainingSettings};
use crate::error::{ForecastError, Result};
use crate::indicators::{IndicatorEngine, IndicatorFrame};
use crate::market::MarketDataSource;
use crate::ml::metrics::{accuracy, roc_auc};
use crate::ml::persistence::SCHEMA_VERSION;
use crate::ml::{
    ArtifactCache, CacheKey, DualHeadPredictor, ModelArtifact, ModelMetadata, SequenceBuilder,
    SequencePredictor,
};
use crate::types::{ForecastRecord, PriceSeries};

/// AUC reported when the validation split holds a single class.
const NEUTRAL_AUC: f64 = 0.5;

/// Result of a pretrain request for one symbol.
#[derive(Debug, Clone)]
pub enum PretrainOutcome {
    Cached(ModelMetadata),
    Trained(ModelMetadata),
}

impl PretrainOutcome {
    pub fn metadata(&self) -> &ModelMetadata {
        match self {
            PretrainOutcome::Cached(m) | PretrainOutcome::Trained(m) => m,
        }
    }
}

/// Orchestrates fetch, indicators, training or cache lookup, inference and
/// post-processing for a single symbol.
pub struct PredictionService {
    source: Arc<dyn MarketDataSource>,
    cache: Arc<dyn ArtifactCache>,
    model: ModelSettings,
    training: TrainingSettings,
    key_locks: StdMutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl PredictionService {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        cache: Arc<dyn ArtifactCache>,
        model: ModelSettings,
        training: TrainingSettings,
    ) -> Self {
        Self {
            source,
            cache,
            model,
            training,
            key_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn horizon(&self) -> usize {
        self.model.horizon
    }

    pub fn cache(&self) -> &Arc<dyn ArtifactCache> {
        &self.cache
    }

    fn key_for(&self, symbol: &str) -> CacheKey {
        CacheKey::new(normalize_symbol(symbol), self.model.horizon)
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drops the map entry once no other request holds or waits on it.
    fn release_key_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    async fn fetch_frame(&self, symbol: &str) -> Result<(PriceSeries, IndicatorFrame)> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(i64::from(self.model.history_days));
        let series = self.source.daily_bars(symbol, start, end).await?;
        if series.is_empty() {
            return Err(ForecastError::DataUnavailable { symbol: symbol.to_string() });
        }
        let frame = IndicatorEngine::compute(&series);
        Ok((series, frame))
    }

    /// Trains and stores a fresh artifact. Callers hold the key lock.
    async fn train_locked(&self, key: &CacheKey) -> Result<ModelArtifact> {
        let symbol = key.symbol.as_str();
        info!("Training new model for {}...", symbol);

        let (series, frame) = self.fetch_frame(symbol).await?;
        info!("Fetched {} data points for {}", series.len(), symbol);

        let builder = SequenceBuilder::new(
            self.model.horizon,
            self.model.sequence_length,
            self.model.min_training_samples,
        );
        let dataset = builder.build(&frame)?;
        info!(
            "Training on {} samples with {} features",
            dataset.len(),
            dataset.feature_names.len()
        );

        let (train, validation) = dataset.split_tail(self.model.validation_fraction);
        let n_features = dataset.feature_names.len();
        let sequence_length = self.model.sequence_length;
        let settings = self.training.clone();

        // fitting is CPU-bound; keep it off the async workers
        let (predictor, report, labels, probabilities) = tokio::task::spawn_blocking(move || {
            let mut predictor = DualHeadPredictor::new(settings, sequence_length, n_features);
            let report = predictor.fit(&train, &validation)?;
            let probabilities = validation
                .x
                .axis_iter(Axis(0))
                .map(|window| predictor.infer(window).map(|o| o.direction_probability))
                .collect::<Result<Vec<f64>>>()?;
            Ok::<_, ForecastError>((predictor, report, validation.y_dir.to_vec(), probabilities))
        })
        .await
        .map_err(|e| ForecastError::Training(e.to_string()))??;

        let val_accuracy = accuracy(&labels, &probabilities);
        let val_auc = roc_auc(&labels, &probabilities).unwrap_or_else(|| {
            warn!("Validation split for {} has a single class, using AUC {}", symbol, NEUTRAL_AUC);
            NEUTRAL_AUC
        });
        info!(
            "Model {} trained - Accuracy: {:.3}, AUC: {:.3}, epochs: {}",
            predictor.name(),
            val_accuracy,
            val_auc,
            report.epochs_trained
        );

        let artifact = ModelArtifact {
            predictor,
            metadata: ModelMetadata {
                schema_version: SCHEMA_VERSION,
                ticker: symbol.to_string(),
                horizon: self.model.horizon,
                sequence_length,
                n_features,
                feature_names: dataset.feature_names.clone(),
                accuracy: val_accuracy,
                auc: val_auc,
                trained_at: Utc::now().to_rfc3339(),
                data_points: series.len(),
                epochs_trained: report.epochs_trained,
            },
            scaler: dataset.scaler,
        };

        self.cache.store(key, &artifact)?;
        Ok(artifact)
    }

    /// Cached artifact when fresh and readable, otherwise a new one.
    /// A cache entry that fails to load is treated as a miss.
    async fn artifact_for(&self, key: &CacheKey, force_retrain: bool) -> Result<(ModelArtifact, bool)> {
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.cached_or_trained(key, force_retrain).await
        };
        self.release_key_lock(key, lock);
        result
    }

    async fn cached_or_trained(&self, key: &CacheKey, force_retrain: bool) -> Result<(ModelArtifact, bool)> {
        if !force_retrain && self.cache.has(key) {
            match self.cache.load(key) {
                Ok(artifact) => {
                    info!("Using cached model for {}", key.symbol);
                    return Ok((artifact, true));
                }
                Err(e) => warn!("Discarding cached model {}: {}", key, e),
            }
        }
        Ok((self.train_locked(key).await?, false))
    }

    pub async fn predict(&self, symbol: &str, force_retrain: bool) -> Result<ForecastRecord> {
        let key = self.key_for(symbol);
        let (artifact, _) = self.artifact_for(&key, force_retrain).await?;

        // always infer on freshly fetched data, never on the training window
        let (_, frame) = self.fetch_frame(&key.symbol).await?;
        let metadata = &artifact.metadata;
        let window = SequenceBuilder::latest_window(
            &frame,
            &metadata.feature_names,
            &artifact.scaler,
            metadata.sequence_length,
        )?;
        let output = artifact.predictor.infer(window.view())?;
        let reading = interpret(output.direction_probability, output.magnitude);

        let current_price = frame
            .closes()
            .and_then(|c| c.last().copied())
            .ok_or_else(|| ForecastError::DataUnavailable { symbol: key.symbol.clone() })?;
        let data_as_of = frame
            .dates()
            .last()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        Ok(ForecastRecord {
            ticker: key.symbol.clone(),
            horizon_days: self.model.horizon as u32,
            direction: reading.direction,
            confidence: round_to(reading.confidence, 2),
            predicted_change_pct: round_to(reading.predicted_change_pct, 2),
            strength: reading.strength,
            raw_probability: round_to(output.direction_probability, 4),
            current_price: round_to(current_price, 2),
            target_price: round_to(target_price(current_price, reading.predicted_change_pct), 2),
            model_accuracy: round_to(metadata.accuracy * 100.0, 2),
            model_auc: round_to(metadata.auc, 4),
            model_trained_at: metadata.trained_at.clone(),
            data_as_of,
        })
    }

    /// Makes sure a fresh artifact exists for each symbol. Failures are
    /// reported per symbol and do not stop the batch.
    pub async fn pretrain(&self, symbols: &[String]) -> Vec<(String, Result<PretrainOutcome>)> {
        let mut outcomes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let key = self.key_for(symbol);
            let outcome = self.artifact_for(&key, false).await.map(|(artifact, cached)| {
                if cached {
                    PretrainOutcome::Cached(artifact.metadata)
                } else {
                    PretrainOutcome::Trained(artifact.metadata)
                }
            });
            match &outcome {
                Ok(o) => info!(
                    "{}: {} (acc {:.1}%, auc {:.3})",
                    key.symbol,
                    if matches!(o, PretrainOutcome::Cached(_)) { "cached" } else { "trained" },
                    o.metadata().accuracy * 100.0,
                    o.metadata().auc
                ),
                Err(e) if e.is_retryable() => warn!("{}: pretrain failed, retry later: {}", key.symbol, e),
                Err(e) => error!("{}: pretrain failed: {}", key.symbol, e),
            }
            outcomes.push((key.symbol, outcome));
        }
        outcomes
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
