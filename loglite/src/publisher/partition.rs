use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use loglite_gax::grpc::Status;
use loglite_gax::retry::RetrySetting;
use loglite_protos::v1::publish_request::RequestType;
use loglite_protos::v1::publish_response::ResponseType;
use loglite_protos::v1::{
    InitialPublishRequest, MessagePublishRequest, PubSubMessage, PublishRequest, PublishResponse,
};

use crate::alarm::Alarm;
use crate::publisher::batching::{assemble_batches, BatchingSettings, MessageBatch};
use crate::publisher::{Awaiter, MessageMetadata, ReservedMessage};
use crate::service::{Health, Service, ServiceComposite};
use crate::stream::{BidiStreamFactory, ResumableStream, StreamInitializer, StreamRead, StreamWrite};
use crate::util::clone_status;

/// A [`BidiStreamFactory`] bound to the publish RPC's message types.
pub trait PublishStreamFactory:
    BidiStreamFactory<Req = PublishRequest, Resp = PublishResponse>
{
}

impl<T> PublishStreamFactory for T where
    T: BidiStreamFactory<Req = PublishRequest, Resp = PublishResponse>
{
}

// Messages move strictly forward: unbatched -> unsent -> in_flight,
// preserving submission order at and between every stage.
struct PublishQueues {
    unbatched: VecDeque<ReservedMessage>,
    unsent: VecDeque<MessageBatch>,
    in_flight: VecDeque<MessageBatch>,
    writing: bool,
}

impl PublishQueues {
    fn new() -> Self {
        Self {
            unbatched: VecDeque::new(),
            unsent: VecDeque::new(),
            in_flight: VecDeque::new(),
            writing: false,
        }
    }

    fn owned_messages(&mut self) -> Vec<ReservedMessage> {
        let mut all = Vec::new();
        for batch in self.in_flight.drain(..) {
            all.extend(batch.messages);
        }
        for batch in self.unsent.drain(..) {
            all.extend(batch.messages);
        }
        all.extend(self.unbatched.drain(..));
        all
    }

    // Rebuilds `unsent` from every owned message in submission order.
    // In-flight batches may already be on the wire; the service
    // deduplicates by client id when they arrive again.
    fn rebatch(&mut self, settings: &BatchingSettings) {
        let all = self.owned_messages();
        self.unsent = assemble_batches(all, settings);
    }
}

// The opening handshake: one initial write, one initial read, then
// every owned message goes back into the unsent queue so the fresh
// stream carries them.
struct PublishHandshake {
    initial: InitialPublishRequest,
    queues: Arc<parking_lot::Mutex<PublishQueues>>,
    settings: BatchingSettings,
}

#[async_trait]
impl<F> StreamInitializer<F> for PublishHandshake
where
    F: PublishStreamFactory,
{
    async fn initialize(&self, write: &mut F::Write, read: &mut F::Read) -> Result<(), Status> {
        write
            .write(PublishRequest {
                request_type: Some(RequestType::InitialRequest(self.initial.clone())),
            })
            .await?;
        match read.read().await? {
            Some(PublishResponse {
                response_type: Some(ResponseType::InitialResponse(_)),
            }) => {}
            Some(_) => return Err(Status::aborted("expected an initial response on the publish stream")),
            None => return Err(Status::aborted("publish stream closed during handshake")),
        }
        self.queues.lock().rebatch(&self.settings);
        Ok(())
    }
}

/// Publishes to a single partition: batches submissions, writes them
/// in order over a resumable publish stream and resolves each handle
/// from the acknowledged start offsets.
pub struct PartitionPublisher<F: PublishStreamFactory> {
    partition: i64,
    settings: BatchingSettings,
    health: Health,
    composite: ServiceComposite,
    stream: Arc<ResumableStream<F, PublishHandshake>>,
    queues: Arc<parking_lot::Mutex<PublishQueues>>,
    alarm: parking_lot::Mutex<Option<Alarm>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl<F: PublishStreamFactory> PartitionPublisher<F> {
    pub fn new(
        topic: String,
        partition: i64,
        client_id: Vec<u8>,
        settings: BatchingSettings,
        retry: RetrySetting,
        factory: Arc<F>,
        health: Health,
    ) -> Arc<Self> {
        let queues = Arc::new(parking_lot::Mutex::new(PublishQueues::new()));
        let handshake = PublishHandshake {
            initial: InitialPublishRequest {
                topic,
                partition,
                client_id,
            },
            queues: Arc::clone(&queues),
            settings: settings.clone(),
        };
        let stream = Arc::new(ResumableStream::new(factory, handshake, retry, health.clone()));
        let composite = ServiceComposite::new(health.clone());
        composite.add_service(Arc::clone(&stream) as Arc<dyn Service>);
        Arc::new(Self {
            partition,
            settings,
            health,
            composite,
            stream,
            queues,
            alarm: parking_lot::Mutex::new(None),
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn partition(&self) -> i64 {
        self.partition
    }

    /// Queues one message. Never blocks; the returned [`Awaiter`]
    /// resolves with the assigned offset or a terminal error.
    pub fn publish(&self, message: PubSubMessage) -> Awaiter {
        let (producer, consumer) = oneshot::channel();
        self.publish_reserved(ReservedMessage { producer, message });
        Awaiter::new(consumer)
    }

    pub(crate) fn publish_reserved(&self, reserved: ReservedMessage) {
        // checked under the queue lock: the stop watcher drains under
        // the same lock, so a message is either queued before the
        // drain or rejected here
        let rejected = {
            let mut queues = self.queues.lock();
            match self.health.check() {
                Ok(()) => {
                    queues.unbatched.push_back(reserved);
                    None
                }
                Err(status) => Some((reserved, status)),
            }
        };
        if let Some((reserved, status)) = rejected {
            let _ = reserved.producer.send(Err(status));
        }
    }

    /// Batches everything submitted so far and starts the write
    /// pipeline if it is idle. Non-blocking.
    pub fn flush(&self) {
        flush_queues(&self.queues, &self.settings, &self.stream, &self.health);
    }
}

#[async_trait]
impl<F: PublishStreamFactory> Service for PartitionPublisher<F> {
    fn start(&self) {
        {
            let mut tasks = self.tasks.lock();
            if !tasks.is_empty() {
                return;
            }
            tasks.push(tokio::spawn(read_loop(
                Arc::clone(&self.queues),
                Arc::clone(&self.stream),
                self.health.clone(),
                self.partition,
            )));
            tasks.push(tokio::spawn(fail_owned_on_stop(
                Arc::clone(&self.queues),
                self.health.clone(),
            )));
        }
        let queues = Arc::clone(&self.queues);
        let stream = Arc::clone(&self.stream);
        let health = self.health.clone();
        let settings = self.settings.clone();
        *self.alarm.lock() = Some(Alarm::register(self.settings.flush_period, move || {
            flush_queues(&queues, &settings, &stream, &health);
            std::future::ready(())
        }));
        self.composite.start();
    }

    async fn shutdown(&self) {
        let alarm = self.alarm.lock().take();
        if let Some(alarm) = alarm {
            alarm.cancel().await;
        }
        let _ = self.composite.shutdown().await;
        let status = match self.health.check() {
            Err(status) => status,
            Ok(()) => Status::cancelled("publisher has been shut down"),
        };
        fail_owned(&self.queues, &status);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

fn flush_queues<F: PublishStreamFactory>(
    queues: &Arc<parking_lot::Mutex<PublishQueues>>,
    settings: &BatchingSettings,
    stream: &Arc<ResumableStream<F, PublishHandshake>>,
    health: &Health,
) {
    let start_writer = {
        let mut locked = queues.lock();
        let drained: Vec<ReservedMessage> = locked.unbatched.drain(..).collect();
        let mut batches = assemble_batches(drained, settings);
        locked.unsent.append(&mut batches);
        if locked.writing || locked.unsent.is_empty() || health.check().is_err() {
            false
        } else {
            locked.writing = true;
            true
        }
    };
    if start_writer {
        tokio::spawn(write_batches(
            Arc::clone(queues),
            Arc::clone(stream),
            health.clone(),
        ));
    }
}

// The `writing` flag serialises pipelines: exactly one of these tasks
// runs at a time.
async fn write_batches<F: PublishStreamFactory>(
    queues: Arc<parking_lot::Mutex<PublishQueues>>,
    stream: Arc<ResumableStream<F, PublishHandshake>>,
    health: Health,
) {
    loop {
        let request = {
            let mut locked = queues.lock();
            if health.check().is_err() {
                locked.writing = false;
                return;
            }
            match locked.unsent.pop_front() {
                None => {
                    locked.writing = false;
                    return;
                }
                Some(batch) => {
                    // payloads are copied, not moved: after a reconnect
                    // the batch is rebatched and written again
                    let messages = batch.messages.iter().map(|m| m.message.clone()).collect();
                    locked.in_flight.push_back(batch);
                    PublishRequest {
                        request_type: Some(RequestType::MessagePublishRequest(MessagePublishRequest {
                            messages,
                        })),
                    }
                }
            }
        };
        if !stream.write(request).await {
            // reconnecting or shut down; the flush alarm restarts the
            // pipeline once the stream is usable again
            queues.lock().writing = false;
            return;
        }
    }
}

async fn read_loop<F: PublishStreamFactory>(
    queues: Arc<parking_lot::Mutex<PublishQueues>>,
    stream: Arc<ResumableStream<F, PublishHandshake>>,
    health: Health,
    partition: i64,
) {
    loop {
        let response = match stream.read().await {
            Some(response) => response,
            None => {
                // the resumable stream is reconnecting or shut down
                if health.check().is_err() {
                    return;
                }
                continue;
            }
        };
        let ack = match response.response_type {
            Some(ResponseType::MessageResponse(ack)) => ack,
            _ => {
                health.abort(Status::internal("unexpected response type on publish stream"));
                return;
            }
        };
        let Some(start_cursor) = ack.start_cursor else {
            health.abort(Status::internal("message response missing start cursor"));
            return;
        };
        let batch = queues.lock().in_flight.pop_front();
        let Some(batch) = batch else {
            health.abort(Status::failed_precondition(
                "Server sent message response when no batches were outstanding.",
            ));
            return;
        };
        // handles resolve outside the lock, in submission order
        for (index, reserved) in batch.messages.into_iter().enumerate() {
            let metadata = MessageMetadata {
                partition,
                offset: start_cursor.offset + index as i64,
            };
            if reserved.producer.send(Ok(metadata)).is_err() {
                tracing::trace!("publish handle dropped before completion: {metadata}");
            }
        }
    }
}

async fn fail_owned_on_stop(queues: Arc<parking_lot::Mutex<PublishQueues>>, health: Health) {
    let status = match health.terminated().await {
        Ok(()) => Status::cancelled("publisher has been shut down"),
        Err(status) => status,
    };
    fail_owned(&queues, &status);
}

fn fail_owned(queues: &parking_lot::Mutex<PublishQueues>, status: &Status) {
    let owned = queues.lock().owned_messages();
    for reserved in owned {
        let _ = reserved.producer.send(Err(clone_status(status)));
    }
}
