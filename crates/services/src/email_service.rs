//! The downstream service: subscriber mirror, rate history, mailing.

use std::sync::Arc;

use broker::{
    EventConsumer, EventProducer, MAIL, MailData, RATES, RateData, SUBSCRIPTIONS, SubscriberData,
};
use rates::{
    EmailSender, InMemoryRateRepository, MailCommandHandler, MailNotifier, RateRecorder, schedule,
};
use saga::{InMemorySubscriberRegistry, SubscriptionMirror};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::transport::Transport;

type Notifier = MailNotifier<InMemoryRateRepository, InMemorySubscriberRegistry>;

/// Running pieces of the email service.
pub struct EmailService {
    subscriptions: EventConsumer<SubscriberData>,
    rate_events: EventConsumer<RateData>,
    mail_commands: EventConsumer<MailData>,
    mirror: Arc<SubscriptionMirror<InMemorySubscriberRegistry>>,
    mail_producer: Arc<EventProducer<MailData>>,
    notifier: Arc<Notifier>,
    rates: Arc<InMemoryRateRepository>,
    config: ServiceConfig,
}

impl EmailService {
    /// Wires the service. `mailer` delivers the `SendEmail` commands this
    /// service consumes. `shutdown` bounds handler work once it fires.
    pub async fn build(
        config: ServiceConfig,
        transport: &Transport,
        mailer: Arc<dyn EmailSender>,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        let broker_config = &config.broker;
        let caller = config.blocking_caller();

        let subscribers = Arc::new(InMemorySubscriberRegistry::new());
        let compensations = EventProducer::new(
            transport
                .producer(broker_config.queue(&broker_config.user_compensate_queue))
                .await?,
            SUBSCRIPTIONS,
        );
        let mirror = SubscriptionMirror::new(
            Arc::clone(&subscribers),
            compensations,
            caller.clone(),
            shutdown.clone(),
        );
        let subscriptions = EventConsumer::new(
            transport
                .consumer(broker_config.queue(&broker_config.user_queue))
                .await?,
            SUBSCRIPTIONS,
        );
        mirror.register(&subscriptions);

        let rates = Arc::new(InMemoryRateRepository::new());
        let rate_events = EventConsumer::new(
            transport
                .consumer(broker_config.queue(&broker_config.rate_queue))
                .await?,
            RATES,
        );
        RateRecorder::new(Arc::clone(&rates), caller.clone(), shutdown.clone())
            .register(&rate_events);

        let mail_commands = EventConsumer::new(
            transport
                .consumer(broker_config.queue(&broker_config.mail_queue))
                .await?,
            MAIL,
        );
        MailCommandHandler::new(mailer, shutdown.clone()).register(&mail_commands);

        // The notifier goes through the mail queue like any other sender.
        let mail_producer: Arc<EventProducer<MailData>> = Arc::new(EventProducer::new(
            transport
                .producer(broker_config.queue(&broker_config.mail_queue))
                .await?,
            MAIL,
        ));
        let notifier = MailNotifier::new(
            Arc::clone(&mail_producer) as Arc<dyn EmailSender>,
            Arc::clone(&rates),
            subscribers,
            caller,
        );

        Ok(Self {
            subscriptions,
            rate_events,
            mail_commands,
            mirror,
            mail_producer,
            notifier: Arc::new(notifier),
            rates,
            config,
        })
    }

    pub fn subscribers(&self) -> &Arc<InMemorySubscriberRegistry> {
        self.mirror.registry()
    }

    pub fn rates(&self) -> &Arc<InMemoryRateRepository> {
        &self.rates
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Starts the three consumers and the periodic notifier.
    pub fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            every = ?self.config.notification_interval,
            "starting email service"
        );
        let notifier = Arc::clone(&self.notifier);
        let cancel = shutdown.clone();
        vec![
            self.subscriptions.start(shutdown.clone()),
            self.rate_events.start(shutdown.clone()),
            self.mail_commands.start(shutdown.clone()),
            schedule::every(
                "notifier",
                self.config.notification_interval,
                shutdown.clone(),
                move || {
                    let notifier = Arc::clone(&notifier);
                    let cancel = cancel.clone();
                    async move { notifier.notify(&cancel).await.map(|_| ()) }
                },
            ),
        ]
    }

    /// Closes every broker connection the service holds.
    pub async fn close(&self) -> Result<()> {
        self.mirror.close().await?;
        self.mail_producer.close().await?;
        self.subscriptions.close().await?;
        self.rate_events.close().await?;
        self.mail_commands.close().await?;
        Ok(())
    }
}
