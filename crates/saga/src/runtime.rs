//! Consumer runtime: polls subscriptions, retries failures and commits.

use std::sync::Arc;

use broker::{BrokerExt, MessageBroker, Record};
use common::{Clock, RandomSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::handler::MessageHandler;
use crate::order_fulfillment::FulfillmentSettings;
use crate::relay::DeadLetterRouter;

/// One consumer group reading one topic.
#[derive(Clone)]
pub struct Subscription {
    pub topic: &'static str,
    pub group: &'static str,
    /// Number of workers. Worker `w` owns partitions `p` with `p % n == w`.
    pub concurrency: usize,
    /// Hand whole poll batches to the handler and commit once per batch.
    pub batch: bool,
    pub handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    pub fn new(
        topic: &'static str,
        group: &'static str,
        concurrency: usize,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            topic,
            group,
            concurrency: concurrency.max(1),
            batch: false,
            handler,
        }
    }

    pub fn batched(mut self) -> Self {
        self.batch = true;
        self
    }

    fn stage(&self) -> &'static str {
        self.handler.name()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("group", &self.group)
            .field("concurrency", &self.concurrency)
            .field("batch", &self.batch)
            .field("stage", &self.stage())
            .finish()
    }
}

/// Every subscription the process runs, assembled at start-up.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    subscriptions: Vec<Subscription>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, subscription: Subscription) -> &mut Self {
        tracing::debug!(
            topic = subscription.topic,
            group = subscription.group,
            stage = subscription.stage(),
            concurrency = subscription.concurrency,
            "subscription registered"
        );
        self.subscriptions.push(subscription);
        self
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// Drives every registered subscription against a broker.
///
/// Offsets are committed after the handler finishes, including retries and
/// dead-lettering, so a crash mid-record causes redelivery, never loss.
pub struct ConsumerRuntime<B> {
    broker: B,
    registry: StageRegistry,
    dead_letters: DeadLetterRouter<B>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    settings: FulfillmentSettings,
}

impl<B: MessageBroker + Clone + 'static> ConsumerRuntime<B> {
    pub fn new(
        broker: B,
        registry: StageRegistry,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            dead_letters: DeadLetterRouter::new(broker.clone()),
            broker,
            registry,
            clock,
            random,
            settings,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Polls one partition once and handles what it got.
    ///
    /// Returns the number of records committed. An error means a dead letter
    /// could not be published; the offending record stays uncommitted.
    pub async fn poll_partition(&self, subscription: &Subscription, partition: u32) -> Result<usize> {
        let records = self
            .broker
            .poll(
                subscription.group,
                subscription.topic,
                partition,
                self.settings.max_poll_records,
            )
            .await?;
        let Some(last) = records.last() else {
            return Ok(0);
        };

        if subscription.batch {
            let results = subscription.handler.handle_batch(&records).await;
            for (record, result) in records.iter().zip(results) {
                self.settle(subscription, record, result).await?;
            }
            self.commit(subscription, partition, last).await?;
            return Ok(records.len());
        }

        for record in &records {
            let result = subscription.handler.handle(record).await;
            self.settle(subscription, record, result).await?;
            self.commit(subscription, partition, record).await?;
        }
        Ok(records.len())
    }

    async fn commit(&self, subscription: &Subscription, partition: u32, last: &Record) -> Result<()> {
        self.broker
            .commit(
                subscription.group,
                subscription.topic,
                partition,
                last.offset.next(),
            )
            .await?;
        Ok(())
    }

    /// Retries a failed record with backoff, then dead-letters it.
    async fn settle(
        &self,
        subscription: &Subscription,
        record: &Record,
        mut result: Result<()>,
    ) -> Result<()> {
        let stage = subscription.stage();
        metrics::counter!("stage_messages_total", "stage" => stage).increment(1);

        let mut delays = self.settings.retry.backoff(self.random.as_ref());
        let mut attempts = 1u32;
        loop {
            let error = match result {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };
            metrics::counter!("stage_failures_total", "stage" => stage).increment(1);

            let next = if error.is_retryable() { delays.next() } else { None };
            if let Some(delay) = next {
                tracing::warn!(
                    stage,
                    source = %record.coordinates(),
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "handler failed, retrying"
                );
                self.clock.sleep(delay).await;
                attempts += 1;
                result = subscription.handler.handle(record).await;
                continue;
            }

            tracing::error!(
                stage,
                source = %record.coordinates(),
                attempts,
                error = %error,
                "handler failed, giving up"
            );
            self.dead_letters
                .route(
                    record,
                    subscription.group,
                    stage,
                    &error,
                    attempts,
                    self.clock.now(),
                )
                .await?;
            return Ok(());
        }
    }

    /// Polls every subscription until a full pass finds nothing new.
    ///
    /// Returns the number of records handled.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let mut pass = 0;
            for subscription in self.registry.subscriptions() {
                let partitions = self.broker.partition_count(subscription.topic).await?;
                for partition in 0..partitions {
                    pass += self.poll_partition(subscription, partition).await?;
                }
            }
            if pass == 0 {
                return Ok(total);
            }
            total += pass;
        }
    }

    /// Starts the workers of every subscription.
    ///
    /// Workers stop after their current poll once `shutdown` turns true.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for subscription in self.registry.subscriptions() {
            let workers = subscription.concurrency;
            for worker in 0..workers {
                let runtime = Arc::clone(&self);
                let subscription = subscription.clone();
                let shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    runtime
                        .run_worker(subscription, worker, workers, shutdown)
                        .await;
                }));
            }
        }
        tracing::info!(
            subscriptions = self.registry.len(),
            workers = handles.len(),
            "consumer runtime started"
        );
        handles
    }

    async fn run_worker(
        &self,
        subscription: Subscription,
        worker: usize,
        workers: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let partitions = match self.broker.partition_count(subscription.topic).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(topic = subscription.topic, error = %e, "cannot start worker");
                return;
            }
        };
        let owned: Vec<u32> = (0..partitions)
            .filter(|p| *p as usize % workers == worker)
            .collect();
        if owned.is_empty() {
            tracing::debug!(
                stage = subscription.stage(),
                worker,
                "no partitions assigned, worker idle"
            );
            return;
        }

        tracing::info!(
            stage = subscription.stage(),
            group = subscription.group,
            worker,
            partitions = ?owned,
            "worker started"
        );

        while !*shutdown.borrow() {
            let mut handled = 0;
            for partition in &owned {
                match self.poll_partition(&subscription, *partition).await {
                    Ok(count) => handled += count,
                    Err(e) => tracing::error!(
                        stage = subscription.stage(),
                        partition,
                        error = %e,
                        "poll failed"
                    ),
                }
            }

            if handled == 0 {
                tokio::select! {
                    _ = self.broker.wait_for_records(self.settings.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(stage = subscription.stage(), worker, "worker stopped");
    }
}
