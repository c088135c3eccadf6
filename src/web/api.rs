use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use super::AppState;
use crate::engine::{normalize_symbol, postprocess::round_to};

#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub force_retrain: bool,
}

/// Entry of the `/cached` listing.
#[derive(Debug, Serialize)]
pub struct CachedModelSummary {
    pub ticker: String,
    pub horizon: usize,
    /// Validation accuracy in percent.
    pub accuracy: f64,
    pub auc: f64,
    pub trained_at: String,
}

pub async fn post_predict(
    State(state): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Unreadable predict body: {}", rejection);
            PredictRequest::default()
        }
    };

    let ticker = normalize_symbol(request.ticker.as_deref().unwrap_or_default());
    if ticker.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Ticker is required"}))).into_response();
    }

    match state.service.predict(&ticker, request.force_retrain).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => {
            error!("Prediction for {} failed ({}): {}", ticker, e.kind(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "horizon_days": state.service.horizon(),
        "cached_models": state.service.cache().count(),
    }))
}

pub async fn get_cached(State(state): State<AppState>) -> impl IntoResponse {
    let models: Vec<CachedModelSummary> = state
        .service
        .cache()
        .list()
        .into_iter()
        .map(|m| CachedModelSummary {
            ticker: m.ticker,
            horizon: m.horizon,
            accuracy: round_to(m.accuracy * 100.0, 2),
            auc: round_to(m.auc, 4),
            trained_at: m.trained_at,
        })
        .collect();
    Json(models)
}
