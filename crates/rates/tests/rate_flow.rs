//! Rate facts and mail commands flowing across an in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use broker::{
    Consumer, EventConsumer, EventProducer, InMemoryBroker, MAIL, MailData, Producer, QueueConfig,
    RATES, RateData,
};
use common::BlockingCaller;
use rates::{
    InMemoryRateRepository, MailCommandHandler, MailNotifier, RateJob, RateRecorder,
    RateRepository, RecordingEmailSender, StaticRateSource,
};
use saga::InMemorySubscriberRegistry;
use tokio_util::sync::CancellationToken;

fn config(queue: &str) -> QueueConfig {
    QueueConfig::new("memory://", queue)
}

async fn consumer(broker: &InMemoryBroker, queue: &str) -> Arc<Consumer> {
    Arc::new(Consumer::new(Arc::new(broker.clone()), config(queue)).await.unwrap())
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
async fn test_fetched_rate_is_recorded_and_mailed() {
    let broker = InMemoryBroker::new();
    let stop = CancellationToken::new();
    let caller = BlockingCaller::default();

    // Downstream wiring: rate history, mail commands, notifier.
    let repository = Arc::new(InMemoryRateRepository::new());
    let rate_events = EventConsumer::<RateData>::new(consumer(&broker, "rate").await, RATES);
    RateRecorder::new(Arc::clone(&repository), caller.clone(), stop.clone()).register(&rate_events);

    let sender = RecordingEmailSender::new();
    let mail_commands = EventConsumer::<MailData>::new(consumer(&broker, "mail").await, MAIL);
    MailCommandHandler::new(Arc::new(sender.clone()), stop.clone()).register(&mail_commands);

    let mail_producer: EventProducer<MailData> =
        EventProducer::new(Producer::new(Arc::new(broker.clone()), config("mail")), MAIL);
    let notifier = MailNotifier::new(
        Arc::new(mail_producer),
        Arc::clone(&repository),
        Arc::new(InMemorySubscriberRegistry::with_subscribers([
            "a@x.com", "b@x.com",
        ])),
        caller,
    );

    let loops = [rate_events.start(stop.clone()), mail_commands.start(stop.clone())];

    // Origin: fetch and publish one rate.
    let job = RateJob::new(
        Arc::new(StaticRateSource::new("fixed").with_rate("USD", "UAH", 41.25)),
        EventProducer::new(Producer::new(Arc::new(broker.clone()), config("rate")), RATES),
        "USD",
        "UAH",
    );
    let rate = job.run(&stop).await.unwrap();

    assert!(eventually(|| !repository.is_empty()).await);
    assert_eq!(repository.latest("USD", "UAH").unwrap(), Some(rate));

    assert_eq!(notifier.notify(&stop).await.unwrap(), 2);
    assert!(eventually(|| !sender.sent().is_empty()).await);

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].emails, vec!["a@x.com", "b@x.com"]);
    assert_eq!(sent[0].subject, "USD-UAH exchange rate");
    assert_eq!(sent[0].body, "1 USD = 41.250000 UAH");

    stop.cancel();
    for handle in loops {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_rate_events_ignore_foreign_types() {
    let broker = InMemoryBroker::new();
    let stop = CancellationToken::new();
    let repository = Arc::new(InMemoryRateRepository::new());
    let rate_events = EventConsumer::<RateData>::new(consumer(&broker, "rate").await, RATES);
    RateRecorder::new(Arc::clone(&repository), BlockingCaller::default(), stop.clone())
        .register(&rate_events);

    // A message of another family on the same queue is skipped, not decoded.
    let stray: EventProducer<MailData> =
        EventProducer::new(Producer::new(Arc::new(broker.clone()), config("rate")), MAIL);
    stray
        .send(
            &stop,
            "SendEmail",
            MailData {
                emails: vec![],
                subject: String::new(),
                body: String::new(),
            },
        )
        .await
        .unwrap();
    broker::Broker::close(&broker).await.unwrap();

    rate_events.consumer().listen(stop).await;

    assert!(repository.is_empty());
}
