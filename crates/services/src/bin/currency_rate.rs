//! Currency-rate service entry point.

use rates::RateSource as _;
use services::{CurrencyRateService, ServiceConfig, Transport, shutdown, telemetry};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = ServiceConfig::from_env().expect("invalid configuration");
    telemetry::init(config.log_level());

    let span = tracing::info_span!("service", service = "currency-rate");
    run(config).instrument(span).await;
}

async fn run(config: ServiceConfig) {
    // 2. Wire the service
    let transport = Transport::from_uri(&config.broker.broker_uri);
    let source = CurrencyRateService::rate_source(&config).expect("rate source not configured");
    tracing::info!(source = source.name(), ?transport, "building currency-rate service");
    let service = CurrencyRateService::build(config, &transport, source)
        .await
        .expect("failed to build currency-rate service");

    // 3. Run until SIGINT or SIGTERM
    let stop = CancellationToken::new();
    let tasks = service.start(&stop);
    shutdown::shutdown_signal().await;
    stop.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background task failed");
        }
    }
    if let Err(e) = service.close().await {
        tracing::error!(error = %e, "error closing broker connections");
    }
    tracing::info!("currency-rate service shut down gracefully");
}
