//! Capability collector interface.

use crate::inventory::{LocalInterfaceRecord, RadioInventory};
use crate::RadioError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of the local interface and radio inventory.
///
/// Polled at startup and on explicit refresh. Results are read-only for the
/// caller; an empty radio inventory is valid.
#[async_trait]
pub trait CapabilityCollector: Send + Sync {
    /// Local interfaces in a stable order
    async fn local_interfaces(&self) -> Result<Vec<LocalInterfaceRecord>, RadioError>;

    /// Radio inventory
    async fn radio_inventory(&self) -> Result<RadioInventory, RadioError>;
}

#[derive(Debug, Default)]
struct Snapshot {
    interfaces: Vec<LocalInterfaceRecord>,
    radios: RadioInventory,
}

/// Collector serving a fixed inventory, replaceable at runtime
#[derive(Debug, Clone, Default)]
pub struct StaticCollector {
    inner: Arc<RwLock<Snapshot>>,
}

impl StaticCollector {
    /// Create a collector with the given inventory
    pub fn new(interfaces: Vec<LocalInterfaceRecord>, radios: RadioInventory) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot { interfaces, radios })),
        }
    }

    /// Replace the inventory seen by the next poll
    pub async fn replace(&self, interfaces: Vec<LocalInterfaceRecord>, radios: RadioInventory) {
        debug!(
            "Static collector now reports {} interfaces and {} radios",
            interfaces.len(),
            radios.len()
        );
        *self.inner.write().await = Snapshot { interfaces, radios };
    }
}

#[async_trait]
impl CapabilityCollector for StaticCollector {
    async fn local_interfaces(&self) -> Result<Vec<LocalInterfaceRecord>, RadioError> {
        Ok(self.inner.read().await.interfaces.clone())
    }

    async fn radio_inventory(&self) -> Result<RadioInventory, RadioError> {
        Ok(self.inner.read().await.radios.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ieee1905_wire::{MacAddr, MediaType};

    #[tokio::test]
    async fn test_static_collector_serves_replacements() {
        let collector = StaticCollector::default();
        assert!(collector.local_interfaces().await.unwrap().is_empty());
        assert!(collector.radio_inventory().await.unwrap().is_empty());

        let eth = LocalInterfaceRecord::wired(
            MacAddr::new(0x02, 0, 0, 0, 0, 1),
            MediaType::GIGABIT_ETHERNET,
        );
        let shared = collector.clone();
        shared
            .replace(vec![eth.clone()], RadioInventory::default())
            .await;
        assert_eq!(collector.local_interfaces().await.unwrap(), vec![eth]);
        assert!(collector.radio_inventory().await.unwrap().is_empty());
    }
}
