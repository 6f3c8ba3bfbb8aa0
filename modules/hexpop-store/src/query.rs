use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::PgPool;

use hexpop_common::DistrictPopulation;

/// All cells with a geometry as a GeoJSON FeatureCollection in EPSG:4326.
///
/// Properties are built by Postgres so column values (nulls included) pass
/// through untouched.
pub async fn hex_population(pool: &PgPool) -> Result<Value> {
    let rows = sqlx::query_as::<_, (Value, Value)>(
        r#"
        SELECT
            ST_AsGeoJSON(ST_Transform(geom, 4326))::jsonb AS geometry,
            jsonb_build_object(
                'hex_id', hex_id,
                'district_name', district_name,
                'age_0_14', age_0_14,
                'age_15_24', age_15_24,
                'age_25_59', age_25_59,
                'age_60_up', age_60_up,
                'total_population', total_population,
                'z_score_age_0_14', z_score_age_0_14,
                'p_value_age_0_14', p_value_age_0_14,
                'z_score_age_15_24', z_score_age_15_24,
                'p_value_age_15_24', p_value_age_15_24,
                'z_score_age_25_59', z_score_age_25_59,
                'p_value_age_25_59', p_value_age_25_59,
                'z_score_age_60_up', z_score_age_60_up,
                'p_value_age_60_up', p_value_age_60_up,
                'z_score_total_population', z_score_total_population,
                'p_value_total_population', p_value_total_population
            ) AS properties
        FROM population_by_hex_filled_table
        WHERE geom IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to load hex population")?;

    Ok(feature_collection(rows))
}

/// Wrap `(geometry, properties)` pairs into a FeatureCollection.
pub fn feature_collection(rows: Vec<(Value, Value)>) -> Value {
    let features: Vec<Value> = rows
        .into_iter()
        .map(|(geometry, properties)| {
            json!({
                "type": "Feature",
                "geometry": geometry,
                "properties": properties,
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Precomputed district totals, in table order.
pub async fn district_chart(pool: &PgPool) -> Result<Vec<DistrictPopulation>> {
    let rows = sqlx::query_as::<_, (String, Option<f64>)>(
        r#"
        SELECT district::text, population::double precision
        FROM district_population_chart
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to load district population chart")?;

    Ok(rows
        .into_iter()
        .map(|(district, population)| DistrictPopulation { district, population })
        .collect())
}
