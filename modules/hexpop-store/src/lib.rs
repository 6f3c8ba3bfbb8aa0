//! Spatial Store access: loading the hex grid, writing statistic columns
//! back, and the read queries behind the HTTP API.

pub mod cells;
pub mod geometry;
pub mod query;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use hexpop_common::Config;

pub use cells::{load_cells, write_results, HexCell, WriteSummary};
pub use query::{district_chart, feature_collection, hex_population};

/// Connection options built from the `PG_*` settings.
pub fn connect_options(config: &Config) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.pg_host)
        .port(config.pg_port)
        .username(&config.pg_user)
        .password(&config.pg_password)
        .database(&config.pg_db)
}

/// Open a connection pool against the configured database.
pub async fn connect(config: &Config, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options(config))
        .await
        .with_context(|| {
            format!(
                "Failed to connect to postgres at {}:{}/{}",
                config.pg_host, config.pg_port, config.pg_db
            )
        })
}
