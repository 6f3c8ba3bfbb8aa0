//! Adds the statistic columns and the chart table if they are missing.
//!
//! Migrations are embedded at compile time. Run once before the first batch.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hexpop_common::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hexpop=info".parse()?)
                .add_directive("run_migrations=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let pool = hexpop_store::connect(&config, 2).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Migrations completed successfully.");

    Ok(())
}
