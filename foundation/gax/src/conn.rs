use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("tonic error : {0}")]
    TonicTransport(#[from] tonic::transport::Error),

    #[error("invalid emulator host: {0}")]
    InvalidEmulatorHost(String),
}

/// Where the pooled channels point: a local emulator over plain HTTP
/// or the production endpoint over TLS.
#[derive(Debug, Clone)]
pub enum Environment {
    Emulator(String),
    Production,
}

#[derive(Debug)]
struct AtomicRing<T>
where
    T: Clone + Debug,
{
    index: AtomicUsize,
    values: Vec<T>,
}

impl<T> AtomicRing<T>
where
    T: Clone + Debug,
{
    fn next(&self) -> T {
        let current = self.index.fetch_add(1, Ordering::SeqCst);
        //clone() reuses http/2 connection
        self.values[current % self.values.len()].clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl ConnectionOptions {
    fn apply(&self, mut endpoint: Endpoint) -> Endpoint {
        endpoint = match self.timeout {
            Some(t) => endpoint.timeout(t),
            None => endpoint,
        };
        endpoint = match self.connect_timeout {
            Some(t) => endpoint.connect_timeout(t),
            None => endpoint,
        };
        endpoint
    }
}

#[derive(Debug)]
pub struct ConnectionManager {
    inner: AtomicRing<Channel>,
}

impl ConnectionManager {
    pub async fn new(
        pool_size: usize,
        domain_name: &str,
        audience: &'static str,
        environment: &Environment,
        conn_options: &ConnectionOptions,
    ) -> Result<Self, Error> {
        let conns = match environment {
            Environment::Production => {
                Self::create_connections(pool_size, domain_name, audience, conn_options).await?
            }
            Environment::Emulator(host) => Self::create_emulator_connections(host, conn_options).await?,
        };
        Ok(Self {
            inner: AtomicRing {
                index: AtomicUsize::new(0),
                values: conns,
            },
        })
    }

    async fn create_connections(
        pool_size: usize,
        domain_name: &str,
        audience: &'static str,
        conn_options: &ConnectionOptions,
    ) -> Result<Vec<Channel>, Error> {
        let tls_config = ClientTlsConfig::new().with_webpki_roots().domain_name(domain_name);
        let mut conns = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let endpoint = Channel::from_static(audience).tls_config(tls_config.clone())?;
            let endpoint = conn_options.apply(endpoint);
            conns.push(endpoint.connect().await?);
        }
        Ok(conns)
    }

    async fn create_emulator_connections(
        host: &str,
        conn_options: &ConnectionOptions,
    ) -> Result<Vec<Channel>, Error> {
        let endpoint = Channel::from_shared(format!("http://{host}").into_bytes())
            .map_err(|_| Error::InvalidEmulatorHost(host.to_string()))?;
        let endpoint = conn_options.apply(endpoint);
        Ok(vec![endpoint.connect().await?])
    }

    pub fn num(&self) -> usize {
        self.inner.values.len()
    }

    pub fn conn(&self) -> Channel {
        self.inner.next()
    }
}
