use std::sync::Arc;

use crate::engine::PredictionService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>) -> Self {
        Self { service }
    }
}
