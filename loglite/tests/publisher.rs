use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use tokio::sync::mpsc;

use loglite::location::TopicName;
use loglite::publisher::batching::BatchingSettings;
use loglite::publisher::{PartitionCountSource, Publisher, PublisherConfig};
use loglite::stream::{BidiStreamFactory, StreamRead, StreamWrite};
use loglite_gax::grpc::{Code, Status};
use loglite_gax::retry::RetrySetting;
use loglite_protos::v1::publish_request::RequestType;
use loglite_protos::v1::publish_response::ResponseType;
use loglite_protos::v1::{
    Cursor, InitialPublishRequest, InitialPublishResponse, MessagePublishResponse, PubSubMessage,
    PublishRequest, PublishResponse,
};

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// ---------------------------------------------------------------------
// mock transport: every connect() hands the server end to the test
// ---------------------------------------------------------------------

type ServerResponse = Result<Option<PublishResponse>, Status>;

struct ServerStream {
    requests: mpsc::UnboundedReceiver<PublishRequest>,
    responses: mpsc::UnboundedSender<ServerResponse>,
}

impl ServerStream {
    /// Reads the opening request and answers it.
    async fn expect_initial(&mut self) -> InitialPublishRequest {
        match self.requests.recv().await.expect("stream closed").request_type {
            Some(RequestType::InitialRequest(initial)) => {
                self.responses
                    .send(Ok(Some(PublishResponse {
                        response_type: Some(ResponseType::InitialResponse(InitialPublishResponse {})),
                    })))
                    .expect("client gone");
                initial
            }
            other => panic!("expected an initial request, got {other:?}"),
        }
    }

    async fn next_batch(&mut self) -> Vec<PubSubMessage> {
        match self.requests.recv().await.expect("stream closed").request_type {
            Some(RequestType::MessagePublishRequest(publish)) => publish.messages,
            other => panic!("expected a message publish request, got {other:?}"),
        }
    }

    fn ack(&self, start_offset: i64) {
        self.responses
            .send(Ok(Some(PublishResponse {
                response_type: Some(ResponseType::MessageResponse(MessagePublishResponse {
                    start_cursor: Some(Cursor { offset: start_offset }),
                })),
            })))
            .expect("client gone");
    }

    /// Server half-close; the client is expected to reconnect.
    fn close(&self) {
        let _ = self.responses.send(Ok(None));
    }
}

struct MockFactory {
    // when set, every connect attempt fails with this status
    broken: std::sync::Mutex<Option<(Code, String)>>,
    accepts: mpsc::UnboundedSender<ServerStream>,
}

impl MockFactory {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerStream>) {
        let (accepts, accepted) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                broken: std::sync::Mutex::new(None),
                accepts,
            }),
            accepted,
        )
    }

    fn break_connections(&self, status: Status) {
        *self.broken.lock().unwrap() = Some((status.code(), status.message().to_string()));
    }
}

struct MockWrite {
    tx: mpsc::UnboundedSender<PublishRequest>,
}

#[async_trait]
impl StreamWrite<PublishRequest> for MockWrite {
    async fn write(&mut self, req: PublishRequest) -> Result<(), Status> {
        self.tx.send(req).map_err(|_| Status::unavailable("server went away"))
    }
}

struct MockRead {
    rx: mpsc::UnboundedReceiver<ServerResponse>,
}

#[async_trait]
impl StreamRead<PublishResponse> for MockRead {
    async fn read(&mut self) -> Result<Option<PublishResponse>, Status> {
        match self.rx.recv().await {
            Some(response) => response,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BidiStreamFactory for MockFactory {
    type Req = PublishRequest;
    type Resp = PublishResponse;
    type Write = MockWrite;
    type Read = MockRead;

    async fn connect(&self) -> Result<(MockWrite, MockRead), Status> {
        if let Some((code, message)) = self.broken.lock().unwrap().as_ref() {
            return Err(Status::new(*code, message.clone()));
        }
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        self.accepts
            .send(ServerStream {
                requests: request_rx,
                responses: response_tx,
            })
            .map_err(|_| Status::unavailable("acceptor gone"))?;
        Ok((MockWrite { tx: request_tx }, MockRead { rx: response_rx }))
    }
}

struct MockAdmin {
    script: std::sync::Mutex<VecDeque<Result<i64, Status>>>,
    fallback: std::sync::Mutex<Option<i64>>,
    delay: std::sync::Mutex<Duration>,
}

impl MockAdmin {
    fn with_counts(counts: &[i64]) -> Arc<Self> {
        Arc::new(Self {
            script: std::sync::Mutex::new(counts.iter().map(|c| Ok(*c)).collect()),
            fallback: std::sync::Mutex::new(None),
            delay: std::sync::Mutex::new(Duration::ZERO),
        })
    }

    fn failing(status: Status) -> Arc<Self> {
        Arc::new(Self {
            script: std::sync::Mutex::new(VecDeque::from([Err(status)])),
            fallback: std::sync::Mutex::new(None),
            delay: std::sync::Mutex::new(Duration::ZERO),
        })
    }

    fn push(&self, result: Result<i64, Status>) {
        self.script.lock().unwrap().push_back(result);
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl PartitionCountSource for MockAdmin {
    async fn partition_count(&self, _topic: &TopicName) -> Result<i64, Status> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(count)) => {
                *self.fallback.lock().unwrap() = Some(count);
                Ok(count)
            }
            Some(Err(status)) => Err(status),
            None => match *self.fallback.lock().unwrap() {
                Some(count) => Ok(count),
                None => Err(Status::unavailable("partition count not scripted")),
            },
        }
    }
}

// ---------------------------------------------------------------------

fn test_topic() -> TopicName {
    TopicName::new("test-project", "us-central1-a".parse().unwrap(), "test-topic")
}

fn test_config() -> PublisherConfig {
    PublisherConfig {
        batching: BatchingSettings::default(),
        partition_poll_period: Duration::from_secs(60),
        retry_setting: Some(RetrySetting {
            from_millis: 1,
            max_delay: Some(Duration::from_millis(5)),
            factor: 2,
            take: 10,
            codes: vec![
                Code::DeadlineExceeded,
                Code::Aborted,
                Code::Internal,
                Code::Unavailable,
                Code::Unknown,
                Code::ResourceExhausted,
            ],
        }),
    }
}

fn message(data: &str) -> PubSubMessage {
    PubSubMessage {
        data: data.as_bytes().to_vec(),
        ..Default::default()
    }
}

fn keyed_message(key: &str, data: &str) -> PubSubMessage {
    PubSubMessage {
        key: key.as_bytes().to_vec(),
        data: data.as_bytes().to_vec(),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_happy_path_single_partition() -> Result<(), anyhow::Error> {
    let (factory, mut accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[1]);
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let mut server = accepted.recv().await.unwrap();
    let initial = server.expect_initial().await;
    assert_eq!(initial.topic, test_topic().to_string());
    assert_eq!(initial.partition, 0);
    assert_eq!(initial.client_id.len(), 16);

    let awaiters: Vec<_> = (0..3).map(|i| publisher.publish(message(&format!("m{i}")))).collect();

    let batch = server.next_batch().await;
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].data, b"m0");
    server.ack(100);

    for (i, awaiter) in awaiters.into_iter().enumerate() {
        let metadata = awaiter.get(None).await?;
        assert_eq!(metadata.partition, 0);
        assert_eq!(metadata.offset, 100 + i as i64);
    }

    publisher.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_messages_buffered_before_first_poll() -> Result<(), anyhow::Error> {
    let (factory, mut accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[2]);
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    // no partitions exist yet: these land in the initial buffer
    let first = publisher.publish(message("m1"));
    let second = publisher.publish(message("m2"));

    let mut server_a = accepted.recv().await.unwrap();
    let mut server_b = accepted.recv().await.unwrap();
    let initial_a = server_a.expect_initial().await;
    let initial_b = server_b.expect_initial().await;
    let mut partitions = vec![initial_a.partition, initial_b.partition];
    partitions.sort_unstable();
    assert_eq!(partitions, vec![0, 1]);

    // unkeyed round-robin: one buffered message per partition
    let batch_a = server_a.next_batch().await;
    let batch_b = server_b.next_batch().await;
    assert_eq!(batch_a.len(), 1);
    assert_eq!(batch_b.len(), 1);
    server_a.ack(10);
    server_b.ack(20);

    let metadata_1 = first.get(None).await?;
    let metadata_2 = second.get(None).await?;
    let mut routed = vec![metadata_1.partition, metadata_2.partition];
    routed.sort_unstable();
    assert_eq!(routed, vec![0, 1]);

    publisher.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_partition_growth_creates_new_publisher() -> Result<(), anyhow::Error> {
    let (factory, mut accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[2, 3]);
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let mut server_0 = accepted.recv().await.unwrap();
    let mut server_1 = accepted.recv().await.unwrap();
    server_0.expect_initial().await;
    server_1.expect_initial().await;

    // the next poll (60s alarm) reads 3 and adds exactly one publisher
    let mut server_2 = accepted.recv().await.unwrap();
    let initial = server_2.expect_initial().await;
    assert_eq!(initial.partition, 2);

    // SHA-256("key") mod 3 routes to the new partition
    let awaiter = publisher.publish(keyed_message("key", "payload"));
    let batch = server_2.next_batch().await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].key, b"key");
    server_2.ack(7);

    let metadata = awaiter.get(None).await?;
    assert_eq!(metadata.partition, 2);
    assert_eq!(metadata.offset, 7);

    publisher.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_offsets_resolve_in_submission_order_across_batches() -> Result<(), anyhow::Error> {
    let (factory, mut accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[1]);
    let mut config = test_config();
    config.batching.max_batch_messages = 2;
    let publisher = Publisher::new(test_topic(), config, admin, factory)?;
    publisher.start();

    let mut server = accepted.recv().await.unwrap();
    server.expect_initial().await;

    let awaiters: Vec<_> = (0..5).map(|i| publisher.publish(message(&format!("m{i}")))).collect();

    // the pipeline writes batches back to back without waiting for acks
    assert_eq!(server.next_batch().await.len(), 2);
    assert_eq!(server.next_batch().await.len(), 2);
    assert_eq!(server.next_batch().await.len(), 1);
    server.ack(0);
    server.ack(2);
    server.ack(4);

    let mut offsets = Vec::new();
    for awaiter in awaiters {
        offsets.push(awaiter.get(None).await?.offset);
    }
    assert_eq!(offsets, vec![0, 1, 2, 3, 4]);

    publisher.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_reconnect_resends_in_flight_batch() -> Result<(), anyhow::Error> {
    let (factory, mut accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[1]);
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let mut server = accepted.recv().await.unwrap();
    server.expect_initial().await;

    let awaiters: Vec<_> = (0..2).map(|i| publisher.publish(message(&format!("m{i}")))).collect();
    let batch = server.next_batch().await;
    assert_eq!(batch.len(), 2);

    // the server goes away without acking: the batch is in flight
    server.close();

    // a fresh stream comes up, the handshake repeats, and the batch is
    // sent again; the service dedupes by client id
    let mut server = accepted.recv().await.unwrap();
    server.expect_initial().await;
    let resent = server.next_batch().await;
    assert_eq!(resent.len(), 2);
    assert_eq!(resent[0].data, b"m0");
    server.ack(200);

    for (i, awaiter) in awaiters.into_iter().enumerate() {
        let metadata = awaiter.get(None).await?;
        assert_eq!(metadata.offset, 200 + i as i64);
    }

    publisher.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_permanent_stream_error_fails_outstanding_handles() -> Result<(), anyhow::Error> {
    let (factory, _accepted) = MockFactory::new();
    factory.break_connections(Status::internal("Permanent Error"));
    let admin = MockAdmin::with_counts(&[1]);
    // INTERNAL is retryable; the permanent status comes from running
    // the retry policy dry
    let mut config = test_config();
    if let Some(retry) = config.retry_setting.as_mut() {
        retry.take = 2;
    }
    let publisher = Publisher::new(test_topic(), config, admin, factory)?;

    let awaiter = publisher.publish(message("doomed"));
    publisher.start();

    let status = publisher.terminated().await.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "Permanent Error");

    let status = awaiter.get(None).await.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "Permanent Error");

    // shutdown still completes, reporting the latched failure
    let status = publisher.shutdown().await.unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_unexpected_ack_aborts_with_precondition_failure() -> Result<(), anyhow::Error> {
    let (factory, mut accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[1]);
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let mut server = accepted.recv().await.unwrap();
    server.expect_initial().await;

    // an ack with nothing outstanding is a protocol violation
    server.ack(100);

    let status = publisher.terminated().await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert_eq!(
        status.message(),
        "Server sent message response when no batches were outstanding."
    );

    // handles submitted afterwards resolve with the latched status
    let awaiter = publisher.publish(message("late"));
    let status = awaiter.get(None).await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);

    let status = publisher.shutdown().await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_first_poll_failure_aborts() -> Result<(), anyhow::Error> {
    let (factory, _accepted) = MockFactory::new();
    let admin = MockAdmin::failing(Status::permission_denied("topic is off limits"));
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let status = publisher.terminated().await.unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);

    let _ = publisher.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_later_poll_failure_is_ignored() -> Result<(), anyhow::Error> {
    let (factory, mut accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[1]);
    admin.push(Err(Status::unavailable("admin hiccup")));
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let mut server = accepted.recv().await.unwrap();
    server.expect_initial().await;

    // ride past the next poll; the failure is logged and ignored
    tokio::time::sleep(Duration::from_secs(61)).await;

    let awaiter = publisher.publish(message("still works"));
    let batch = server.next_batch().await;
    assert_eq!(batch.len(), 1);
    server.ack(0);
    assert_eq!(awaiter.get(None).await?.offset, 0);

    publisher.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_partition_count_above_u32_is_permanent() -> Result<(), anyhow::Error> {
    let (factory, _accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[1i64 << 32]);
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let status = publisher.terminated().await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(status.message().contains("4294967296"));

    let _ = publisher.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_shutdown_resolves_buffered_messages() -> Result<(), anyhow::Error> {
    let (factory, _accepted) = MockFactory::new();
    // the first poll is still in flight when shutdown runs
    let admin = MockAdmin::with_counts(&[1]);
    admin.set_delay(Duration::from_secs(10));
    let publisher = Publisher::new(test_topic(), test_config(), admin, factory)?;
    publisher.start();

    let awaiter = publisher.publish(message("parked"));
    let _ = publisher.shutdown().await;

    let status = awaiter.get(None).await.unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);

    // publishing after shutdown resolves immediately with an error
    let status = publisher.publish(message("too late")).get(None).await.unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_invalid_batching_settings_are_rejected() -> Result<(), anyhow::Error> {
    let (factory, _accepted) = MockFactory::new();
    let admin = MockAdmin::with_counts(&[1]);
    let mut config = test_config();
    config.batching.max_batch_messages = 0;
    let err = Publisher::new(test_topic(), config, admin, factory).err().unwrap();
    assert_eq!(err.code(), Code::InvalidArgument);
    Ok(())
}
