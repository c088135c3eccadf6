pub mod postprocess;
pub mod service;

pub use service::{normalize_symbol, PredictionService, PretrainOutcome};
