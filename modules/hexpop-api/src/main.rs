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
                .add_directive("api=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    let pool = hexpop_store::connect(&config, 5).await?;
    let app = hexpop_api::build_router(pool, &config.cors_allowed_origins);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!(origins = ?config.cors_allowed_origins, "Hex population API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
