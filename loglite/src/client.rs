use std::sync::Arc;

use loglite_gax::conn::{ConnectionOptions, Environment, Error};
use loglite_gax::grpc::Status;

use crate::apiv1::admin_client::AdminClient;
use crate::apiv1::conn_pool::ConnectionManager;
use crate::apiv1::publisher_client::GrpcPublishStreamFactory;
use crate::location::TopicName;
use crate::publisher::{Publisher, PublisherConfig};

/// Environment variable selecting a local emulator endpoint.
pub const EMULATOR_HOST_VAR: &str = "LOGLITE_EMULATOR_HOST";

pub struct ClientConfig {
    pub pool_size: usize,
    pub environment: Environment,
    pub connection_options: ConnectionOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let environment = match std::env::var(EMULATOR_HOST_VAR) {
            Ok(host) => Environment::Emulator(host),
            Err(_) => Environment::Production,
        };
        Self {
            pool_size: 4,
            environment,
            connection_options: ConnectionOptions::default(),
        }
    }
}

/// Client scoped to one service endpoint.
///
/// Holds a channel pool; reuse one client for all the topics it
/// serves rather than creating clients per topic.
#[derive(Clone)]
pub struct Client {
    cm: Arc<ConnectionManager>,
}

impl Client {
    pub async fn new(config: ClientConfig) -> Result<Self, Error> {
        let cm =
            ConnectionManager::new(config.pool_size, &config.environment, &config.connection_options)
                .await?;
        Ok(Self { cm: Arc::new(cm) })
    }

    /// Creates a publisher for the topic. Call [`Publisher::start`]
    /// before publishing and [`Publisher::shutdown`] when done; a
    /// publisher left running keeps background tasks alive.
    pub fn publisher(&self, topic: TopicName, config: PublisherConfig) -> Result<Publisher, Status> {
        let admin = Arc::new(AdminClient::new(Arc::clone(&self.cm)));
        let factory = Arc::new(GrpcPublishStreamFactory::new(Arc::clone(&self.cm)));
        Publisher::new(topic, config, admin, factory)
    }
}
