use std::collections::VecDeque;
use std::time::Duration;

use prost::Message;

use loglite_gax::grpc::Status;

use super::ReservedMessage;

/// Hard cap the service places on messages per publish request.
pub const MAX_BATCH_MESSAGES: usize = 1000;
/// Hard cap the service places on bytes per publish request (3.5 MiB).
pub const MAX_BATCH_BYTES: usize = 3_670_016;

#[derive(Clone, Debug)]
pub struct BatchingSettings {
    pub max_batch_messages: usize,
    pub max_batch_bytes: usize,
    /// Period of the background flush.
    pub flush_period: Duration,
}

impl Default for BatchingSettings {
    fn default() -> Self {
        Self {
            max_batch_messages: MAX_BATCH_MESSAGES,
            max_batch_bytes: MAX_BATCH_BYTES,
            flush_period: Duration::from_millis(50),
        }
    }
}

impl BatchingSettings {
    /// Rejects zero limits and clamps limits above the service caps.
    pub fn validated(mut self) -> Result<BatchingSettings, Status> {
        if self.max_batch_messages == 0 {
            return Err(Status::invalid_argument("max_batch_messages must be positive"));
        }
        if self.max_batch_bytes == 0 {
            return Err(Status::invalid_argument("max_batch_bytes must be positive"));
        }
        self.max_batch_messages = self.max_batch_messages.min(MAX_BATCH_MESSAGES);
        self.max_batch_bytes = self.max_batch_bytes.min(MAX_BATCH_BYTES);
        Ok(self)
    }
}

pub(crate) struct MessageBatch {
    pub messages: Vec<ReservedMessage>,
    pub byte_size: usize,
}

impl MessageBatch {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            byte_size: 0,
        }
    }
}

/// Groups messages into batches, preserving submission order within
/// and across batches.
///
/// A batch stays strictly within both limits, with one exception: a
/// message bigger than `max_batch_bytes` on its own still forms a
/// singleton batch.
pub(crate) fn assemble_batches(
    messages: impl IntoIterator<Item = ReservedMessage>,
    settings: &BatchingSettings,
) -> VecDeque<MessageBatch> {
    let mut batches = VecDeque::new();
    let mut current = MessageBatch::new();
    for reserved in messages {
        let size = reserved.message.encoded_len();
        let full = !current.messages.is_empty()
            && (current.messages.len() >= settings.max_batch_messages
                || current.byte_size + size > settings.max_batch_bytes);
        if full {
            batches.push_back(std::mem::replace(&mut current, MessageBatch::new()));
        }
        current.byte_size += size;
        current.messages.push(reserved);
    }
    if !current.messages.is_empty() {
        batches.push_back(current);
    }
    batches
}
