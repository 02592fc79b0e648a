use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

/// Chooses a target partition for each message.
///
/// Unkeyed messages round-robin over the partitions; keyed messages
/// hash the key so a given key sticks to one partition for any fixed
/// partition count. The keyed algorithm must match the other client
/// libraries for the service, so that keys land on the same partition
/// regardless of which library published them.
pub struct RoutingPolicy {
    counter: AtomicU64,
}

impl RoutingPolicy {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn route_unkeyed(&self, num_partitions: u32) -> u32 {
        debug_assert!(num_partitions > 0);
        (self.counter.fetch_add(1, Ordering::Relaxed) % u64::from(num_partitions)) as u32
    }

    pub fn route(&self, key: &[u8], num_partitions: u32) -> u32 {
        debug_assert!(num_partitions > 0);
        let digest: [u8; 32] = Sha256::digest(key).into();
        digest_mod(&digest, num_partitions)
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

// The digest read as a 256-bit big-endian integer, reduced byte by
// byte: (acc * 256 + b) mod m needs only u64 arithmetic since m fits
// in 32 bits.
fn digest_mod(digest: &[u8; 32], modulus: u32) -> u32 {
    let modulus = u64::from(modulus);
    let mut acc: u64 = 0;
    for byte in digest {
        acc = (acc * 256 + u64::from(*byte)) % modulus;
    }
    acc as u32
}
