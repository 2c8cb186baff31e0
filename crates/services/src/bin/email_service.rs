//! Email service entry point.

use std::sync::Arc;

use rates::LogEmailSender;
use services::{EmailService, ServiceConfig, Transport, shutdown, telemetry};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = ServiceConfig::from_env().expect("invalid configuration");
    telemetry::init(config.log_level());

    let span = tracing::info_span!("service", service = "email-service");
    run(config).instrument(span).await;
}

async fn run(config: ServiceConfig) {
    // 2. Wire the service
    let transport = Transport::from_uri(&config.broker.broker_uri);
    let mailer = Arc::new(LogEmailSender::new(config.mail_from.clone()));
    let stop = CancellationToken::new();
    let service = EmailService::build(config, &transport, mailer, &stop)
        .await
        .expect("failed to build email service");

    // 3. Run until SIGINT or SIGTERM
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
    tracing::info!("email service shut down gracefully");
}
