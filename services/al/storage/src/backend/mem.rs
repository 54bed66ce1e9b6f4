//! In-memory de-duplication backend

use crate::{Dedup, MessageKey, StorageError, DEFAULT_CAPACITY, DEFAULT_RETENTION};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// In-memory deduplication keyed by (source, message id)
#[derive(Clone)]
pub struct MemoryDedup {
    /// When each message was first processed
    seen: Arc<DashMap<MessageKey, Instant>>,
    retention: Duration,
    capacity: usize,
}

impl MemoryDedup {
    /// Create a store remembering messages for `retention`
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            retention,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Bound the number of remembered messages
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Number of remembered messages
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn fresh(&self, at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(at) < self.retention
    }

    fn purge_stale(&self, now: Instant) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, at| self.fresh(*at, now));
        before.saturating_sub(self.seen.len())
    }
}

impl Default for MemoryDedup {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[async_trait]
impl Dedup for MemoryDedup {
    async fn try_mark(&self, key: MessageKey) -> Result<bool, StorageError> {
        let now = Instant::now();
        // make room before taking the entry lock; retain locks every shard
        if self.seen.len() >= self.capacity && !self.seen.contains_key(&key) {
            self.purge_stale(now);
            if self.seen.len() >= self.capacity {
                warn!("Dedup full with {} live entries, rejecting {}", self.capacity, key);
                return Err(StorageError::CapacityExceeded(self.capacity));
            }
        }

        match self.seen.entry(key) {
            Entry::Occupied(mut entry) => {
                if self.fresh(*entry.get(), now) {
                    debug!("Dedup duplicate {}", key);
                    Ok(false)
                } else {
                    entry.insert(now);
                    Ok(true)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(true)
            }
        }
    }

    async fn purge(&self) -> Result<usize, StorageError> {
        let removed = self.purge_stale(Instant::now());
        if removed > 0 {
            debug!("Dedup purged {} entries", removed);
        }
        Ok(removed)
    }
}
