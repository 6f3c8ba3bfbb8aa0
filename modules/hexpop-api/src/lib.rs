//! Read-only HTTP API serving the hex grid and the district chart.

pub mod rest;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Request},
    routing::get,
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{warn, Level};

pub struct AppState {
    pub pool: PgPool,
}

/// CORS for the map frontend: listed origins only, with credentials.
///
/// Methods and headers are mirrored from the request since wildcards are
/// not allowed together with credentials.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = o.as_str(), "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn build_router(pool: PgPool, allowed_origins: &[String]) -> Router {
    let state = Arc::new(AppState { pool });

    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        .route("/hex-population", get(rest::api_hex_population))
        .route("/district-population-chart", get(rest::api_district_population_chart))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        // Results change with every batch run
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // method + path + status + latency
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            })
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
