pub mod batching;
pub mod partition;
pub mod routing;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::select;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use loglite_gax::grpc::Status;
use loglite_gax::retry::RetrySetting;
use loglite_protos::v1::PubSubMessage;

use crate::alarm::Alarm;
use crate::apiv1::default_stream_retry_setting;
use crate::apiv1::publisher_client::GrpcPublishStreamFactory;
use crate::location::TopicName;
use crate::publisher::batching::BatchingSettings;
use crate::publisher::partition::{PartitionPublisher, PublishStreamFactory};
use crate::publisher::routing::RoutingPolicy;
use crate::service::{Health, Service, ServiceComposite};
use crate::util::clone_status;

/// Partition and offset assigned to a published message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageMetadata {
    pub partition: i64,
    pub offset: i64,
}

impl fmt::Display for MessageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.offset)
    }
}

pub(crate) struct ReservedMessage {
    pub producer: oneshot::Sender<Result<MessageMetadata, Status>>,
    pub message: PubSubMessage,
}

/// Single-shot completion for one published message.
pub struct Awaiter {
    consumer: oneshot::Receiver<Result<MessageMetadata, Status>>,
}

impl Awaiter {
    pub(crate) fn new(consumer: oneshot::Receiver<Result<MessageMetadata, Status>>) -> Self {
        Self { consumer }
    }

    /// Blocks until the message has been published (or has failed).
    pub async fn get(self, cancel: Option<CancellationToken>) -> Result<MessageMetadata, Status> {
        let awaited = match cancel {
            Some(cancel) => {
                select! {
                    _ = cancel.cancelled() => return Err(Status::cancelled("cancelled")),
                    v = self.consumer => v
                }
            }
            None => self.consumer.await,
        };
        match awaited {
            Ok(v) => v,
            Err(_e) => Err(Status::cancelled("closed")),
        }
    }
}

/// Looks up how many partitions a topic currently has.
#[async_trait::async_trait]
pub trait PartitionCountSource: Send + Sync + 'static {
    async fn partition_count(&self, topic: &TopicName) -> Result<i64, Status>;
}

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub batching: BatchingSettings,
    /// How often the partition count is refreshed.
    pub partition_poll_period: Duration,
    pub retry_setting: Option<RetrySetting>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batching: BatchingSettings::default(),
            partition_poll_period: Duration::from_secs(60),
            retry_setting: None,
        }
    }
}

struct PublisherState<F: PublishStreamFactory> {
    partitions: Vec<Arc<PartitionPublisher<F>>>,
    // messages accepted before the first partition-count poll landed
    initial_publish_buffer: VecDeque<ReservedMessage>,
    updating_partitions: bool,
    partitions_known: bool,
}

struct PublisherInner<F: PublishStreamFactory> {
    topic: TopicName,
    config: PublisherConfig,
    retry: RetrySetting,
    admin: Arc<dyn PartitionCountSource>,
    factory: Arc<F>,
    routing: RoutingPolicy,
    client_id: Vec<u8>,
    health: Health,
    composite: ServiceComposite,
    state: parking_lot::Mutex<PublisherState<F>>,
    poll_alarm: parking_lot::Mutex<Option<Alarm>>,
    poll_tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

/// Publishes messages to a partitioned topic.
///
/// Discovers the partition count, fans out to one
/// [`PartitionPublisher`] per partition and routes each message by its
/// key. Messages submitted before the first partition-count poll
/// completes are buffered and routed as soon as partitions exist.
pub struct Publisher<F: PublishStreamFactory = GrpcPublishStreamFactory> {
    inner: Arc<PublisherInner<F>>,
}

impl<F: PublishStreamFactory> Clone for Publisher<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: PublishStreamFactory> Publisher<F> {
    pub fn new(
        topic: TopicName,
        config: PublisherConfig,
        admin: Arc<dyn PartitionCountSource>,
        factory: Arc<F>,
    ) -> Result<Publisher<F>, Status> {
        let batching = config.batching.clone().validated()?;
        let retry = config.retry_setting.clone().unwrap_or_else(default_stream_retry_setting);
        let health = Health::new();
        let client_id = rand::thread_rng().gen::<[u8; 16]>().to_vec();
        Ok(Self {
            inner: Arc::new(PublisherInner {
                topic,
                config: PublisherConfig { batching, ..config },
                retry,
                admin,
                factory,
                routing: RoutingPolicy::new(),
                client_id,
                health: health.clone(),
                composite: ServiceComposite::new(health),
                state: parking_lot::Mutex::new(PublisherState {
                    partitions: Vec::new(),
                    initial_publish_buffer: VecDeque::new(),
                    updating_partitions: false,
                    partitions_known: false,
                }),
                poll_alarm: parking_lot::Mutex::new(None),
                poll_tasks: parking_lot::Mutex::new(Vec::new()),
            }),
        })
    }

    /// Starts background work: the partition-count alarm, the child
    /// composite and an immediate partition-count poll.
    pub fn start(&self) {
        {
            let mut alarm = self.inner.poll_alarm.lock();
            if alarm.is_some() {
                return;
            }
            let inner = Arc::clone(&self.inner);
            *alarm = Some(Alarm::register(
                self.inner.config.partition_poll_period,
                move || {
                    let inner = Arc::clone(&inner);
                    async move { poll_partition_count(&inner).await }
                },
            ));
        }
        self.inner.composite.start();

        let inner = Arc::clone(&self.inner);
        let stop_watcher = tokio::spawn(async move {
            let status = match inner.health.terminated().await {
                Ok(()) => Status::cancelled("publisher has been shut down"),
                Err(status) => status,
            };
            fail_buffered(&inner, &status);
        });
        let inner = Arc::clone(&self.inner);
        let startup_poll = tokio::spawn(async move { poll_partition_count(&inner).await });
        let mut tasks = self.inner.poll_tasks.lock();
        tasks.push(stop_watcher);
        tasks.push(startup_poll);
    }

    /// Queues one message for publishing. Never blocks.
    pub fn publish(&self, message: PubSubMessage) -> Awaiter {
        let (producer, consumer) = oneshot::channel();
        let reserved = ReservedMessage { producer, message };
        let dispatched = {
            let mut state = self.inner.state.lock();
            match self.inner.health.check() {
                Err(status) => Err((reserved, status)),
                Ok(()) => {
                    if state.partitions.is_empty() {
                        state.initial_publish_buffer.push_back(reserved);
                        Ok(None)
                    } else {
                        let index = route(&self.inner, &reserved.message, state.partitions.len());
                        Ok(Some((Arc::clone(&state.partitions[index]), reserved)))
                    }
                }
            }
        };
        match dispatched {
            Err((reserved, status)) => {
                let _ = reserved.producer.send(Err(status));
            }
            Ok(Some((target, reserved))) => target.publish_reserved(reserved),
            Ok(None) => {}
        }
        Awaiter::new(consumer)
    }

    /// Flushes every partition publisher. Non-blocking.
    pub fn flush(&self) {
        let partitions = self.inner.state.lock().partitions.clone();
        for publisher in partitions {
            publisher.flush();
        }
    }

    /// Resolves once the publisher stops: `Ok(())` after a clean
    /// shutdown, the first permanent error otherwise.
    pub async fn terminated(&self) -> Result<(), Status> {
        self.inner.health.terminated().await
    }

    /// Stops the publisher. Outstanding handles resolve with the final
    /// status; an in-flight partition-count poll is waited out.
    pub async fn shutdown(&self) -> Result<(), Status> {
        let alarm = self.inner.poll_alarm.lock().take();
        if let Some(alarm) = alarm {
            alarm.cancel().await;
        }
        let shutdown_status = Status::cancelled("publisher has been shut down");
        fail_buffered(&self.inner, &shutdown_status);
        let result = self.inner.composite.shutdown().await;
        let tasks: Vec<_> = self.inner.poll_tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        result
    }
}

fn route<F: PublishStreamFactory>(
    inner: &PublisherInner<F>,
    message: &PubSubMessage,
    num_partitions: usize,
) -> usize {
    let count = num_partitions as u32;
    let index = if message.key.is_empty() {
        inner.routing.route_unkeyed(count)
    } else {
        inner.routing.route(&message.key, count)
    };
    index as usize
}

fn fail_buffered<F: PublishStreamFactory>(inner: &PublisherInner<F>, status: &Status) {
    let buffered: Vec<ReservedMessage> = {
        let mut state = inner.state.lock();
        state.initial_publish_buffer.drain(..).collect()
    };
    for reserved in buffered {
        let _ = reserved.producer.send(Err(clone_status(status)));
    }
}

async fn poll_partition_count<F: PublishStreamFactory>(inner: &Arc<PublisherInner<F>>) {
    if inner.health.check().is_err() {
        return;
    }
    {
        let mut state = inner.state.lock();
        if state.updating_partitions {
            return;
        }
        state.updating_partitions = true;
    }

    let count = match inner.admin.partition_count(&inner.topic).await {
        Ok(count) => count,
        Err(status) => {
            let first_poll = {
                let mut state = inner.state.lock();
                state.updating_partitions = false;
                !state.partitions_known
            };
            // before the first successful poll there is nothing to
            // publish with, so the failure is fatal; afterwards the
            // existing publishers keep working
            if first_poll {
                inner.health.abort(status);
            } else {
                tracing::warn!("failed to refresh partition count for {}: {status}", inner.topic);
            }
            return;
        }
    };

    if count <= 0 || count > i64::from(u32::MAX) {
        inner.state.lock().updating_partitions = false;
        inner.health.abort(Status::failed_precondition(format!(
            "topic {} reported an unusable partition count: {count}",
            inner.topic
        )));
        return;
    }

    let (created, buffered) = {
        let mut state = inner.state.lock();
        state.updating_partitions = false;
        if inner.health.check().is_err() {
            return;
        }
        state.partitions_known = true;
        let current = state.partitions.len() as i64;
        let mut created = Vec::new();
        // the partition count only grows; create just the delta
        for partition in current..count {
            let publisher = PartitionPublisher::new(
                inner.topic.to_string(),
                partition,
                inner.client_id.clone(),
                inner.config.batching.clone(),
                inner.retry.clone(),
                Arc::clone(&inner.factory),
                inner.health.clone(),
            );
            state.partitions.push(Arc::clone(&publisher));
            created.push(publisher);
        }
        let buffered = if created.is_empty() {
            VecDeque::new()
        } else {
            std::mem::take(&mut state.initial_publish_buffer)
        };
        (created, buffered)
    };

    if created.is_empty() {
        return;
    }
    tracing::debug!("partition count for {} is now {count}", inner.topic);
    for publisher in &created {
        inner.composite.add_service(Arc::clone(publisher) as Arc<dyn Service>);
    }
    for reserved in buffered {
        let target = {
            let state = inner.state.lock();
            let index = route(inner, &reserved.message, state.partitions.len());
            Arc::clone(&state.partitions[index])
        };
        target.publish_reserved(reserved);
    }
}
