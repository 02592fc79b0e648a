//! # loglite
//!
//! LogLite client library: publish messages to a partitioned,
//! append-only topic.
//!
//! ## Quick Start
//!
//! ```
//! use loglite::client::{Client, ClientConfig};
//! use loglite::location::TopicName;
//! use loglite::publisher::PublisherConfig;
//! use loglite_protos::v1::PubSubMessage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create the client. Set LOGLITE_EMULATOR_HOST to talk to a
//!     // local emulator.
//!     let client = Client::new(ClientConfig::default()).await?;
//!
//!     let topic = TopicName::new("my-project", "us-central1-a".parse()?, "my-topic");
//!     let publisher = client.publisher(topic, PublisherConfig::default())?;
//!     publisher.start();
//!
//!     // Publish messages. `publish` never blocks; each awaiter
//!     // resolves with the assigned partition and offset.
//!     let mut awaiters = Vec::new();
//!     for i in 0..10u32 {
//!         awaiters.push(publisher.publish(PubSubMessage {
//!             key: b"ordering-key".to_vec(),
//!             data: format!("payload {i}").into_bytes(),
//!             ..Default::default()
//!         }));
//!     }
//!     for awaiter in awaiters {
//!         let metadata = awaiter.get(None).await?;
//!         println!("published at {metadata}");
//!     }
//!
//!     // Resolve the remaining work and stop background tasks.
//!     publisher.shutdown().await?;
//!     Ok(())
//! }
//! ```
pub mod alarm;
pub mod apiv1;
pub mod client;
pub mod location;
pub mod publisher;
pub mod service;
pub mod stream;
mod util;
