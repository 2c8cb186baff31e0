//! Both services wired over one in-process broker.

use std::sync::Arc;
use std::time::Duration;

use common::Subscriber;
use rates::{RecordingEmailSender, StaticRateSource};
use saga::SubscriberRegistry;
use services::{CurrencyRateService, EmailService, ServiceConfig, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Platform {
    origin: CurrencyRateService,
    downstream: EmailService,
    mailer: RecordingEmailSender,
    stop: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Platform {
    async fn start() -> Self {
        let config = ServiceConfig::from_lookup(|key| match key {
            "BROKER_URI" => Some("memory://".to_string()),
            "STATIC_RATE" => Some("41.25".to_string()),
            // Keep the schedules out of the way; tests trigger runs directly.
            "RATE_REFRESH_INTERVAL_SECS" | "NOTIFICATION_INTERVAL_SECS" => {
                Some("3600".to_string())
            }
            _ => None,
        })
        .unwrap();
        let transport = Transport::from_uri(&config.broker.broker_uri);
        let stop = CancellationToken::new();
        let mailer = RecordingEmailSender::new();

        let downstream = EmailService::build(
            config.clone(),
            &transport,
            Arc::new(mailer.clone()),
            &stop,
        )
        .await
        .unwrap();
        let source = Arc::new(StaticRateSource::new("static").with_rate("USD", "UAH", 41.25));
        let origin = CurrencyRateService::build(config, &transport, source)
            .await
            .unwrap();

        let mut tasks = downstream.start(&stop);
        tasks.extend(origin.start(&stop));

        Self {
            origin,
            downstream,
            mailer,
            stop,
            tasks,
        }
    }

    async fn shutdown(self) {
        self.stop.cancel();
        for task in self.tasks {
            task.await.unwrap();
        }
        self.origin.close().await.unwrap();
        self.downstream.close().await.unwrap();
    }
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_subscriber_is_mirrored_and_mailed() {
    let p = Platform::start().await;
    let cancel = CancellationToken::new();

    p.origin
        .saga()
        .create(&cancel, &Subscriber::new("a@x.com"))
        .await
        .unwrap();
    assert!(eventually(|| p.downstream.subscribers().contains("a@x.com")).await);

    // The rate job runs once at start-up.
    assert!(eventually(|| !p.downstream.rates().is_empty()).await);

    assert_eq!(p.downstream.notifier().notify(&cancel).await.unwrap(), 1);
    assert!(eventually(|| !p.mailer.sent().is_empty()).await);
    let sent = p.mailer.sent();
    assert_eq!(sent[0].emails, vec!["a@x.com"]);
    assert_eq!(sent[0].body, "1 USD = 41.250000 UAH");

    p.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_downstream_row_is_compensated_at_origin() {
    let p = Platform::start().await;
    let cancel = CancellationToken::new();
    let subscriber = Subscriber::new("a@x.com");
    p.downstream.subscribers().create(&subscriber).unwrap();

    p.origin.saga().create(&cancel, &subscriber).await.unwrap();

    assert!(eventually(|| !p.origin.saga().registry().contains("a@x.com")).await);
    assert!(!p.origin.saga().exists(&cancel, &subscriber).await.unwrap());

    p.shutdown().await;
}
