pub mod metrics;
pub mod model;
pub mod persistence;
pub mod scaler;
pub mod sequence;

pub use model::{DualHeadPredictor, SequencePredictor};
#[cfg(test)]
pub use persistence::MemoryArtifactCache;
pub use persistence::{ArtifactCache, CacheKey, FileArtifactCache, ModelArtifact, ModelMetadata};
pub use scaler::StandardScaler;
pub use sequence::{SampleSet, SequenceBuilder};
