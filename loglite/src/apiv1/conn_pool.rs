use loglite_gax::conn::{
    ConnectionManager as InternalConnectionManager, ConnectionOptions, Environment, Error,
};
use loglite_gax::grpc::Channel;

pub const AUDIENCE: &str = "https://api.loglite.cloud/";
pub const LOGLITE: &str = "api.loglite.cloud";

#[derive(Debug)]
pub struct ConnectionManager {
    inner: InternalConnectionManager,
}

impl ConnectionManager {
    pub async fn new(
        pool_size: usize,
        environment: &Environment,
        conn_options: &ConnectionOptions,
    ) -> Result<Self, Error> {
        Ok(ConnectionManager {
            inner: InternalConnectionManager::new(pool_size, LOGLITE, AUDIENCE, environment, conn_options)
                .await?,
        })
    }

    pub fn num(&self) -> usize {
        self.inner.num()
    }

    pub fn conn(&self) -> Channel {
        self.inner.conn()
    }
}
