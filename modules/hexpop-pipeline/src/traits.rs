// Storage seam for the pipeline.
//
// PgHexStore is the production implementation over a sqlx pool. Tests drive
// the pipeline with an in-memory store instead: no database, no Docker.

use async_trait::async_trait;
use sqlx::PgPool;

use hexpop_common::{HexPopError, HexResult};
use hexpop_store::{HexCell, WriteSummary};

#[async_trait]
pub trait HexStore: Send + Sync {
    /// Load every grid cell in a stable order.
    async fn load_cells(&self) -> Result<Vec<HexCell>, HexPopError>;

    /// Persist all results atomically: either every row is updated or none.
    async fn write_results(&self, results: &[HexResult]) -> Result<WriteSummary, HexPopError>;
}

/// Spatial Store backed by Postgres.
#[derive(Clone)]
pub struct PgHexStore {
    pool: PgPool,
}

impl PgHexStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HexStore for PgHexStore {
    async fn load_cells(&self) -> Result<Vec<HexCell>, HexPopError> {
        hexpop_store::load_cells(&self.pool).await
    }

    async fn write_results(&self, results: &[HexResult]) -> Result<WriteSummary, HexPopError> {
        hexpop_store::write_results(&self.pool, results).await
    }
}
