use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment prefix for overrides, e.g. `FORECAST__MODEL__HORIZON=10`.
pub const ENV_PREFIX: &str = "FORECAST";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub training: TrainingSettings,
    pub data: DataSettings,
}

impl ForecastConfig {
    /// Loads defaults, then the TOML file at `path` if it exists, then
    /// `FORECAST__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be > 0".to_string());
        }

        // Model validation
        if self.model.horizon == 0 {
            errors.push("model.horizon must be > 0".to_string());
        }
        if self.model.sequence_length == 0 {
            errors.push("model.sequence_length must be > 0".to_string());
        }
        if self.model.history_days <= (self.model.sequence_length + self.model.horizon) as u32 {
            errors.push("model.history_days must exceed sequence_length + horizon".to_string());
        }
        if self.model.validation_fraction <= 0.0 || self.model.validation_fraction >= 1.0 {
            errors.push("model.validation_fraction must be between 0 and 1".to_string());
        }
        if self.model.cache_expiry_days <= 0 {
            errors.push("model.cache_expiry_days must be > 0".to_string());
        }

        // Training validation
        let t = &self.training;
        if t.hidden_units == 0 {
            errors.push("training.hidden_units must be > 0".to_string());
        }
        if t.epochs == 0 {
            errors.push("training.epochs must be > 0".to_string());
        }
        if t.batch_size == 0 {
            errors.push("training.batch_size must be > 0".to_string());
        }
        if t.learning_rate <= 0.0 || t.min_learning_rate <= 0.0 {
            errors.push("training learning rates must be > 0".to_string());
        }
        if t.min_learning_rate > t.learning_rate {
            errors.push("training.min_learning_rate must be <= learning_rate".to_string());
        }
        if t.lr_factor <= 0.0 || t.lr_factor >= 1.0 {
            errors.push("training.lr_factor must be between 0 and 1".to_string());
        }
        if t.l2 < 0.0 || t.magnitude_loss_weight < 0.0 {
            errors.push("training.l2 and magnitude_loss_weight must be >= 0".to_string());
        }
        if t.huber_delta <= 0.0 {
            errors.push("training.huber_delta must be > 0".to_string());
        }

        if self.data.base_url.is_empty() {
            errors.push("data.base_url must not be empty".to_string());
        }
        if self.data.timeout_secs == 0 {
            errors.push("data.timeout_secs must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub horizon: usize,
    pub sequence_length: usize,
    pub history_days: u32,
    pub min_training_samples: usize,
    pub validation_fraction: f64,
    pub cache_expiry_days: i64,
    pub cache_dir: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            horizon: 5,
            sequence_length: 20,
            history_days: 365,
            min_training_samples: 50,
            validation_fraction: 0.2,
            cache_expiry_days: 7,
            cache_dir: PathBuf::from("cached_models"),
        }
    }
}

/// Hyper-parameters for the dual-head predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub hidden_units: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub min_learning_rate: f64,
    pub lr_factor: f64,
    pub lr_patience: usize,
    pub early_stopping_patience: usize,
    pub l2: f64,
    pub magnitude_loss_weight: f64,
    pub huber_delta: f64,
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            hidden_units: 32,
            epochs: 100,
            batch_size: 16,
            learning_rate: 0.001,
            min_learning_rate: 1e-6,
            lr_factor: 0.5,
            lr_patience: 5,
            early_stopping_patience: 15,
            l2: 0.001,
            magnitude_loss_weight: 0.3,
            huber_delta: 1.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            user_agent: "Mozilla/5.0 (compatible; price-forecaster)".to_string(),
            timeout_secs: 30,
        }
    }
}
