use std::sync::atomic::{AtomicU32, Ordering};

use sha2::{Digest, Sha256};

use crate::types::DocumentId;

/// Source of `_id` values for inserted documents that lack one.
pub trait IdGenerator: Send + Sync {
    fn generate_id(&self) -> DocumentId;
}

/// ObjectId-shaped identifiers: 12 bytes rendered as 24 lowercase hex characters.
///
/// Layout: 4-byte big-endian seconds, 3 bytes of host hash, 2 bytes of process id, 3-byte
/// counter seeded randomly per generator.
#[derive(Debug)]
pub struct ObjectIdGenerator {
    host: [u8; 3],
    pid: u16,
    counter: AtomicU32,
}

impl ObjectIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        let host_name = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "localhost".to_owned());
        let digest = Sha256::digest(host_name.as_bytes());
        let pid = (std::process::id() & 0xFFFF) as u16;
        Self {
            host: [digest[0], digest[1], digest[2]],
            pid,
            counter: AtomicU32::new(rand::random::<u32>() & 0x00FF_FFFF),
        }
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for ObjectIdGenerator {
    fn generate_id(&self) -> DocumentId {
        let secs = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX);
        let count = self.counter.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..7].copy_from_slice(&self.host);
        bytes[7..9].copy_from_slice(&self.pid.to_be_bytes());
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        hex::encode(bytes)
    }
}

/// Deterministic ids `prefix` + zero-padded counter, for tests and reproducible fixtures.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU32,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU32::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate_id(&self) -> DocumentId {
        format!("{}{:06}", self.prefix, self.next.fetch_add(1, Ordering::Relaxed))
    }
}
