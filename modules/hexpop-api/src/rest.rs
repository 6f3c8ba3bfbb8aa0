use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;

use hexpop_common::HexPopError;

use crate::AppState;

pub async fn api_hex_population(State(state): State<Arc<AppState>>) -> Response {
    match hexpop_store::hex_population(&state.pool).await {
        Ok(collection) => Json(collection).into_response(),
        Err(e) => error_payload("hex-population", e),
    }
}

pub async fn api_district_population_chart(State(state): State<Arc<AppState>>) -> Response {
    match hexpop_store::district_chart(&state.pool).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => error_payload("district-population-chart", e),
    }
}

/// The map frontend expects failures as a 200 with an `error` key.
fn error_payload(endpoint: &str, err: anyhow::Error) -> Response {
    let message = format!("{err:#}");
    warn!(endpoint, error = %HexPopError::Query(message.clone()), "Request failed");
    Json(json!({ "error": message })).into_response()
}
