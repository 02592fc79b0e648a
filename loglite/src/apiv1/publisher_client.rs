use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use loglite_gax::grpc::{Request, Status, Streaming};
use loglite_protos::v1::publisher_service_client::PublisherServiceClient;
use loglite_protos::v1::{PublishRequest, PublishResponse};

use crate::apiv1::conn_pool::ConnectionManager;
use crate::stream::{BidiStreamFactory, StreamRead, StreamWrite};

/// Opens raw publish streams over pooled gRPC channels. The write
/// half feeds the request stream through a bounded channel; the read
/// half wraps the server's response stream.
pub struct GrpcPublishStreamFactory {
    cm: Arc<ConnectionManager>,
}

impl GrpcPublishStreamFactory {
    pub fn new(cm: Arc<ConnectionManager>) -> Self {
        Self { cm }
    }
}

#[async_trait]
impl BidiStreamFactory for GrpcPublishStreamFactory {
    type Req = PublishRequest;
    type Resp = PublishResponse;
    type Write = GrpcStreamWrite;
    type Read = GrpcStreamRead;

    async fn connect(&self) -> Result<(GrpcStreamWrite, GrpcStreamRead), Status> {
        let mut client = PublisherServiceClient::new(self.cm.conn());
        let (tx, mut rx) = mpsc::channel::<PublishRequest>(16);
        let requests = async_stream::stream! {
            while let Some(request) = rx.recv().await {
                yield request;
            }
        };
        let response = client.publish(Request::new(requests)).await?;
        Ok((
            GrpcStreamWrite { tx },
            GrpcStreamRead {
                inner: response.into_inner(),
            },
        ))
    }
}

pub struct GrpcStreamWrite {
    tx: mpsc::Sender<PublishRequest>,
}

#[async_trait]
impl StreamWrite<PublishRequest> for GrpcStreamWrite {
    async fn write(&mut self, req: PublishRequest) -> Result<(), Status> {
        self.tx
            .send(req)
            .await
            .map_err(|_| Status::unavailable("publish stream disconnected"))
    }
}

pub struct GrpcStreamRead {
    inner: Streaming<PublishResponse>,
}

#[async_trait]
impl StreamRead<PublishResponse> for GrpcStreamRead {
    async fn read(&mut self) -> Result<Option<PublishResponse>, Status> {
        self.inner.message().await
    }
}
