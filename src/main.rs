mod config;

use clap::Parser as _;
use config::Config;
use request_validation::{
    build_metrics_layer_and_handle, build_metrics_router,
    routes::{RoutesFile, build_router},
};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

#[tokio::main]
#[instrument]
pub async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse().validate()?;
    info!("Starting validation server with config: {:?}", config);

    let routes = RoutesFile::from_file(&config.routes).await?;
    let mut router = build_router(&routes, config.body_limit)
        .map_err(|e| anyhow::anyhow!("Failed to build routes: {:#}", e))?;

    if config.metrics {
        let (prometheus_layer, handle) =
            build_metrics_layer_and_handle(config.metrics_prefix.clone());
        router = router.layer(prometheus_layer);

        let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
        let metrics_listener = TcpListener::bind(&metrics_addr).await?;
        info!("Metrics listening on {}", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, build_metrics_router(handle)).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Validation server listening on {}", bind_addr);

    axum::serve(listener, router).await?;

    Ok(())
}
