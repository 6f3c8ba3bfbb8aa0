//! Router tests driven through `tower::ServiceExt::oneshot`.
//!
//! Tests that need real rows require Postgres with PostGIS via
//! DATABASE_TEST_URL and are skipped otherwise.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tower::ServiceExt;

use hexpop_api::build_router;

const FRONTEND: &str = "http://localhost:3000";

/// A pool pointing at a port nothing listens on; every query fails fast.
fn unreachable_pool() -> PgPool {
    let options = PgConnectOptions::new()
        .host("127.0.0.1")
        .port(1)
        .username("nobody")
        .database("nothing");
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(500))
        .connect_lazy_with(options)
}

fn router(pool: PgPool) -> Router {
    build_router(pool, &[FRONTEND.to_string()])
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn health_check_says_ok() {
    let (status, body) = get(router(unreachable_pool()), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn backend_failure_is_200_with_error_key() {
    for uri in ["/hex-population", "/district-population-chart"] {
        let (status, body) = get(router(unreachable_pool()), uri).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        let message = value["error"].as_str().unwrap();
        assert!(!message.is_empty());
    }
}

#[tokio::test]
async fn preflight_from_allowed_origin_is_accepted() {
    let response = router(unreachable_pool())
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/hex-population")
                .header(header::ORIGIN, FRONTEND)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-requested-with")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], FRONTEND);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-requested-with");
}

#[tokio::test]
async fn unknown_origin_gets_no_cors_grant() {
    let response = router(unreachable_pool())
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::ORIGIN, "https://elsewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn responses_are_not_cached() {
    let response = router(unreachable_pool())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn empty_grid_serves_empty_collection() {
    let Ok(url) = std::env::var("DATABASE_TEST_URL") else {
        return;
    };
    let pool = PgPool::connect(&url).await.unwrap();
    sqlx::query("CREATE EXTENSION IF NOT EXISTS postgis")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("DROP TABLE IF EXISTS population_by_hex_filled_table")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        r#"
        CREATE TABLE population_by_hex_filled_table (
            hex_id INTEGER, district_name TEXT,
            age_0_14 DOUBLE PRECISION, age_15_24 DOUBLE PRECISION,
            age_25_59 DOUBLE PRECISION, age_60_up DOUBLE PRECISION,
            total_population DOUBLE PRECISION,
            z_score_age_0_14 DOUBLE PRECISION, p_value_age_0_14 DOUBLE PRECISION,
            z_score_age_15_24 DOUBLE PRECISION, p_value_age_15_24 DOUBLE PRECISION,
            z_score_age_25_59 DOUBLE PRECISION, p_value_age_25_59 DOUBLE PRECISION,
            z_score_age_60_up DOUBLE PRECISION, p_value_age_60_up DOUBLE PRECISION,
            z_score_total_population DOUBLE PRECISION, p_value_total_population DOUBLE PRECISION,
            geom geometry(Polygon, 32647)
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let (status, body) = get(router(pool), "/hex-population").await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({"type": "FeatureCollection", "features": []}));
}
