//! De-duplication storage for received CMDUs.
//!
//! Peers may transmit the same message more than once, and relayed multicast
//! messages can reach the AL over several interfaces. Every interface task
//! consults one shared [`Dedup`] store before acting on a message, so a
//! (source, message id) pair is processed at most once within the retention
//! window.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

use async_trait::async_trait;
use ieee1905_wire::MacAddr;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use backend::mem::MemoryDedup;

/// Default time a processed message id is remembered
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30);

/// Default bound on remembered message ids
pub const DEFAULT_CAPACITY: usize = 4096;

/// Identity of a received message
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MessageKey {
    /// Source hardware address of the frame
    pub src: MacAddr,
    /// CMDU message id
    pub message_id: u16,
}

impl MessageKey {
    /// Create a key
    pub fn new(src: MacAddr, message_id: u16) -> Self {
        Self { src, message_id }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.src, self.message_id)
    }
}

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store holds as many live entries as it may
    #[error("Capacity exceeded: {0} entries")]
    CapacityExceeded(usize),
}

/// De-duplication of processed messages, safe under concurrent callers
#[async_trait]
pub trait Dedup: Send + Sync {
    /// Atomically check and record. Returns `true` only for the first caller.
    async fn try_mark(&self, key: MessageKey) -> Result<bool, StorageError>;

    /// Forget entries older than the retention window; returns how many
    async fn purge(&self) -> Result<usize, StorageError>;
}
