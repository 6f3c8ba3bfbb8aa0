use geo::MultiPolygon;
use sqlx::PgPool;
use tracing::{info, warn};

use hexpop_common::{AgeBands, Attribute, HexPopError, HexResult};

use crate::geometry::parse_multipolygon;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One grid cell as loaded for the pipeline.
#[derive(Debug, Clone)]
pub struct HexCell {
    pub hex_id: Option<i64>,
    pub district_name: Option<String>,
    pub bands: AgeBands,
    pub geometry: Option<MultiPolygon<f64>>,
}

#[derive(sqlx::FromRow)]
struct HexCellRow {
    hex_id: Option<i64>,
    district_name: Option<String>,
    age_0_14: Option<f64>,
    age_15_24: Option<f64>,
    age_25_59: Option<f64>,
    age_60_up: Option<f64>,
    geom: Option<String>,
}

impl HexCellRow {
    fn into_cell(self) -> Result<HexCell, HexPopError> {
        let geometry = match self.geom {
            Some(text) => Some(parse_multipolygon(&text).map_err(|e| {
                HexPopError::GraphConstruction(format!("hex_id {:?}: {e}", self.hex_id))
            })?),
            None => None,
        };
        Ok(HexCell {
            hex_id: self.hex_id,
            district_name: self.district_name,
            bands: AgeBands {
                age_0_14: self.age_0_14,
                age_15_24: self.age_15_24,
                age_25_59: self.age_25_59,
                age_60_up: self.age_60_up,
            },
            geometry,
        })
    }
}

/// Outcome of a committed write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    pub updated: u64,
    /// Hex ids whose UPDATE matched no row.
    pub unmatched: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Load every cell of the grid in a stable order (hex id, then position).
pub async fn load_cells(pool: &PgPool) -> Result<Vec<HexCell>, HexPopError> {
    let rows = sqlx::query_as::<_, HexCellRow>(
        r#"
        SELECT
            hex_id::bigint                   AS hex_id,
            district_name::text              AS district_name,
            age_0_14::double precision       AS age_0_14,
            age_15_24::double precision      AS age_15_24,
            age_25_59::double precision      AS age_25_59,
            age_60_up::double precision      AS age_60_up,
            ST_AsGeoJSON(geom)               AS geom
        FROM population_by_hex_filled_table
        ORDER BY hex_id NULLS LAST, ST_XMin(geom), ST_YMin(geom)
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| HexPopError::Persistence(format!("failed to load hex cells: {e}")))?;

    info!(rows = rows.len(), "Loaded hex cells");
    rows.into_iter().map(HexCellRow::into_cell).collect()
}

/// Write all ten statistic columns for every result inside one transaction.
///
/// Any failing statement rolls the whole batch back; nothing is committed.
pub async fn write_results(
    pool: &PgPool,
    results: &[HexResult],
) -> Result<WriteSummary, HexPopError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| HexPopError::Persistence(format!("failed to open transaction: {e}")))?;

    let mut summary = WriteSummary::default();
    for result in results {
        let mut query = sqlx::query(
            r#"
            UPDATE population_by_hex_filled_table
            SET
                z_score_age_0_14 = $2, p_value_age_0_14 = $3,
                z_score_age_15_24 = $4, p_value_age_15_24 = $5,
                z_score_age_25_59 = $6, p_value_age_25_59 = $7,
                z_score_age_60_up = $8, p_value_age_60_up = $9,
                z_score_total_population = $10, p_value_total_population = $11
            WHERE hex_id = $1
            "#,
        )
        .bind(result.hex_id);
        for attribute in Attribute::ALL {
            let pair = result.get(attribute);
            query = query.bind(pair.z_score).bind(pair.p_value);
        }

        // Dropping `tx` on the error path rolls back every earlier update.
        let done = query.execute(&mut *tx).await.map_err(|e| {
            HexPopError::Persistence(format!("update of hex_id {} failed: {e}", result.hex_id))
        })?;

        if done.rows_affected() == 0 {
            summary.unmatched.push(result.hex_id);
        } else {
            summary.updated += done.rows_affected();
        }
    }

    tx.commit()
        .await
        .map_err(|e| HexPopError::Persistence(format!("commit failed: {e}")))?;

    if !summary.unmatched.is_empty() {
        warn!(
            unmatched = summary.unmatched.len(),
            sample = ?&summary.unmatched[..summary.unmatched.len().min(10)],
            "Some results matched no row"
        );
    }
    info!(updated = summary.updated, "Statistic columns written");
    Ok(summary)
}
