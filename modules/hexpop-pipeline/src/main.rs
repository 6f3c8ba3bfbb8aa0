use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hexpop_common::Config;
use hexpop_pipeline::{PgHexStore, Pipeline, PipelineSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hexpop=info".parse()?)
                .add_directive("gistar=info".parse()?),
        )
        .init();

    info!("Hex population hot spot batch starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let pool = hexpop_store::connect(&config, 2).await?;
    let settings = PipelineSettings::from_config(&config);

    let pipeline = Pipeline::new(PgHexStore::new(pool), settings);
    let report = pipeline.run().await?;
    report.log();

    Ok(())
}
