use std::sync::Arc;

use async_trait::async_trait;

use loglite_gax::create_request;
use loglite_gax::grpc::Status;
use loglite_gax::retry::{invoke_fn, RetrySetting};
use loglite_protos::v1::admin_service_client::AdminServiceClient;
use loglite_protos::v1::GetTopicPartitionsRequest;

use crate::apiv1::conn_pool::ConnectionManager;
use crate::apiv1::default_retry_setting;
use crate::location::TopicName;
use crate::publisher::PartitionCountSource;

/// The slice of the admin API the publisher needs.
#[derive(Clone)]
pub struct AdminClient {
    cm: Arc<ConnectionManager>,
    retry: RetrySetting,
}

impl AdminClient {
    pub fn new(cm: Arc<ConnectionManager>) -> Self {
        Self {
            cm,
            retry: default_retry_setting(),
        }
    }

    /// Fetches the topic's partition count, retrying transient
    /// failures.
    pub async fn get_topic_partitions(&self, name: &str) -> Result<i64, Status> {
        let client = AdminServiceClient::new(self.cm.conn());
        invoke_fn(
            None,
            Some(self.retry.clone()),
            |mut client| async move {
                let request = create_request(
                    format!("name={name}"),
                    GetTopicPartitionsRequest {
                        name: name.to_string(),
                    },
                );
                match client.get_topic_partitions(request).await {
                    Ok(response) => Ok(response.into_inner().partition_count),
                    Err(status) => Err((status, client)),
                }
            },
            client,
        )
        .await
    }
}

#[async_trait]
impl PartitionCountSource for AdminClient {
    async fn partition_count(&self, topic: &TopicName) -> Result<i64, Status> {
        self.get_topic_partitions(&topic.to_string()).await
    }
}
