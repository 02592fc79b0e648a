pub mod admin_client;
pub mod conn_pool;
pub mod publisher_client;

use std::time::Duration;

use loglite_gax::grpc::Code;
use loglite_gax::retry::RetrySetting;

fn retryable_codes() -> Vec<Code> {
    vec![
        Code::DeadlineExceeded,
        Code::Aborted,
        Code::Internal,
        Code::Unavailable,
        Code::Unknown,
        Code::ResourceExhausted,
    ]
}

/// Retry setting for unary calls.
pub fn default_retry_setting() -> RetrySetting {
    RetrySetting {
        from_millis: 100,
        max_delay: Some(Duration::from_secs(10)),
        factor: 2,
        take: 5,
        codes: retryable_codes(),
    }
}

/// Retry setting for publish streams: reconnect for as long as
/// failures stay retryable.
pub fn default_stream_retry_setting() -> RetrySetting {
    RetrySetting {
        from_millis: 100,
        max_delay: Some(Duration::from_secs(10)),
        factor: 2,
        take: usize::MAX,
        codes: retryable_codes(),
    }
}
