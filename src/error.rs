use thiserror::Error;

/// Failure kinds surfaced by the forecasting pipeline.
///
/// The HTTP layer flattens every variant into a single `error` message, but
/// callers inside the crate can branch on the kind.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("No data found for {symbol}")]
    DataUnavailable { symbol: String },

    #[error("Market data request failed: {0}")]
    Upstream(String),

    #[error("Not enough data to train model. Need at least {required} samples, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Feature columns missing from indicator frame: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Cached artifact {key} is unusable: {reason}")]
    CorruptCacheEntry { key: String, reason: String },

    #[error("Training failed: {0}")]
    Training(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl ForecastError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::DataUnavailable { .. } => "data_unavailable",
            ForecastError::Upstream(_) => "upstream",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::SchemaMismatch { .. } => "schema_mismatch",
            ForecastError::CorruptCacheEntry { .. } => "corrupt_cache_entry",
            ForecastError::Training(_) => "training",
            ForecastError::Io(_) => "io",
            ForecastError::Serialization(_) => "serialization",
        }
    }

    /// Data-source failures may succeed on a later attempt; everything else
    /// is deterministic for the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForecastError::DataUnavailable { .. } | ForecastError::Upstream(_))
    }
}

impl From<reqwest::Error> for ForecastError {
    fn from(e: reqwest::Error) -> Self {
        ForecastError::Upstream(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let unavailable = ForecastError::DataUnavailable { symbol: "AAPL".to_string() };
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.kind(), "data_unavailable");

        let insufficient = ForecastError::InsufficientData { required: 50, available: 12 };
        assert!(!insufficient.is_retryable());
        assert_eq!(
            insufficient.to_string(),
            "Not enough data to train model. Need at least 50 samples, got 12"
        );
    }

    #[test]
    fn test_schema_mismatch_message_lists_columns() {
        let err = ForecastError::SchemaMismatch {
            missing: vec!["SMA_50".to_string(), "EMA_50".to_string()],
        };
        assert_eq!(err.to_string(), "Feature columns missing from indicator frame: SMA_50, EMA_50");
    }
}
