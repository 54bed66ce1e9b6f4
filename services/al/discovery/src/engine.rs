//! Engine lifecycle and state shared by the interface tasks.

use crate::config::EngineConfig;
use crate::interface::{InterfaceEvent, InterfaceTask};
use crate::response::{topology_response_tlvs, ResponseContext};
use crate::{EngineError, OutboundFrame};
use futures::future::join_all;
use ieee1905_radio::{CapabilityCollector, LocalInterfaceRecord, RadioInventory};
use ieee1905_storage::{Dedup, MemoryDedup};
use ieee1905_topology::{
    DeviceRecord, NeighborEntry, NeighborTable, TopologyDatabase, TopologyStats,
};
use ieee1905_wire::{Cmdu, Frame, Framer, MacAddr, Tlv, MCAST_1905};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct Inventory {
    interfaces: Vec<LocalInterfaceRecord>,
    radios: RadioInventory,
}

struct InterfaceHandle {
    events: mpsc::UnboundedSender<InterfaceEvent>,
    neighbors: Arc<RwLock<NeighborTable>>,
    task: JoinHandle<()>,
}

/// State shared by the engine handle and every interface task
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) framer: Framer,
    pub(crate) dedup: Arc<dyn Dedup>,
    pub(crate) topology: RwLock<TopologyDatabase>,
    collector: Arc<dyn CapabilityCollector>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    next_mid: AtomicU16,
    inventory: RwLock<Inventory>,
    interfaces: RwLock<BTreeMap<MacAddr, InterfaceHandle>>,
    /// Local interfaces each neighbor AL is currently known on
    links: Mutex<HashMap<MacAddr, BTreeSet<MacAddr>>>,
    housekeeping: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Allocate a message id; wraps at 65535
    pub(crate) fn next_message_id(&self) -> u16 {
        self.next_mid.fetch_add(1, Ordering::Relaxed)
    }

    /// Serialize and queue a message on a local interface
    pub(crate) fn transmit(&self, interface: MacAddr, cmdu: &Cmdu, dst: MacAddr) {
        self.send_from(interface, cmdu, dst, interface);
    }

    fn send_from(&self, interface: MacAddr, cmdu: &Cmdu, dst: MacAddr, src: MacAddr) {
        let frames = match self.framer.frames(cmdu, dst, src) {
            Ok(frames) => frames,
            Err(e) => {
                error!(
                    iface = %interface,
                    "Failed to serialize {:?} (mid {}): {}", cmdu.message_type, cmdu.message_id, e
                );
                return;
            }
        };
        for frame in frames {
            if self.outbound.send(OutboundFrame { interface, frame }).is_err() {
                warn!(iface = %interface, "Link layer is gone, dropping {:?}", cmdu.message_type);
                return;
            }
        }
    }

    /// Queue one notification on every interface, all with the same message id
    pub(crate) async fn notify_all(&self) {
        let message_id = self.next_message_id();
        let interfaces = self.interfaces.read().await;
        debug!(
            "Fanning out topology notification (mid {}) on {} interfaces",
            message_id,
            interfaces.len()
        );
        for handle in interfaces.values() {
            let _ = handle.events.send(InterfaceEvent::Notify { message_id });
        }
    }

    /// Record `al_mac` as a neighbor on `interface`.
    ///
    /// Returns `true` when no other local interface knew it.
    pub(crate) async fn link_up(&self, al_mac: MacAddr, interface: MacAddr) -> bool {
        let mut links = self.links.lock().await;
        let interfaces = links.entry(al_mac).or_default();
        interfaces.insert(interface) && interfaces.len() == 1
    }

    /// Forget `al_mac` on `interface`.
    ///
    /// Returns `true` when no local interface knows it any more.
    pub(crate) async fn link_down(&self, al_mac: MacAddr, interface: MacAddr) -> bool {
        let mut links = self.links.lock().await;
        let Some(interfaces) = links.get_mut(&al_mac) else {
            return false;
        };
        if !interfaces.remove(&interface) || !interfaces.is_empty() {
            return false;
        }
        links.remove(&al_mac);
        true
    }

    /// Drop every neighbor link of a removed interface
    async fn forget_interface(&self, interface: MacAddr) {
        self.links.lock().await.retain(|_, interfaces| {
            interfaces.remove(&interface);
            !interfaces.is_empty()
        });
    }

    /// Forward a relayed multicast message on every interface but `from`
    pub(crate) async fn relay(&self, from: MacAddr, cmdu: &Cmdu, src: MacAddr) {
        let interfaces = self.interfaces.read().await;
        for mac in interfaces.keys().filter(|mac| **mac != from) {
            debug!(iface = %mac, "Relaying {:?} from {}", cmdu.message_type, src);
            self.send_from(*mac, cmdu, MCAST_1905, src);
        }
    }

    /// Whether `mac` is our AL address or one of our interfaces
    pub(crate) async fn is_local_address(&self, mac: MacAddr) -> bool {
        mac == self.config.al_mac
            || self
                .inventory
                .read()
                .await
                .interfaces
                .iter()
                .any(|i| i.mac == mac)
    }

    /// Current topology response contents
    pub(crate) async fn response_tlvs(&self) -> Vec<Tlv> {
        let inventory = self.inventory.read().await;
        let interfaces = self.interfaces.read().await;
        let mut neighbors = Vec::with_capacity(interfaces.len());
        for (mac, handle) in interfaces.iter() {
            neighbors.push((*mac, handle.neighbors.read().await.neighbor_devices()));
        }
        let ctx = ResponseContext {
            al_mac: self.config.al_mac,
            interfaces: &inventory.interfaces,
            radios: &inventory.radios,
            neighbors: &neighbors,
            bridges: &self.config.bridges,
            controller: self.config.controller,
            agent: self.config.agent,
            multi_ap: self.config.multi_ap,
        };
        topology_response_tlvs(&ctx)
    }
}

fn spawn_interface(shared: &Arc<Shared>, mac: MacAddr) -> InterfaceHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let neighbors = Arc::new(RwLock::new(NeighborTable::new(mac)));
    let task = InterfaceTask::new(shared, mac, neighbors.clone(), rx);
    InterfaceHandle {
        events: tx,
        neighbors,
        task: tokio::spawn(task.run()),
    }
}

async fn stop_interfaces(shared: &Shared, handles: Vec<(MacAddr, InterfaceHandle)>) {
    let mut stopped = Vec::with_capacity(handles.len());
    let mut tasks = Vec::with_capacity(handles.len());
    for (mac, handle) in handles {
        let _ = handle.events.send(InterfaceEvent::Shutdown);
        stopped.push(mac);
        tasks.push(async move {
            if let Err(e) = handle.task.await {
                error!(iface = %mac, "Interface task failed: {}", e);
            }
        });
    }
    join_all(tasks).await;
    for mac in stopped {
        shared.forget_interface(mac).await;
    }
}

async fn housekeeping(shared: Weak<Shared>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match shared.dedup.purge().await {
            Ok(0) => {}
            Ok(n) => debug!("Purged {} processed message ids", n),
            Err(e) => warn!("Failed to purge processed message ids: {}", e),
        }
        shared
            .topology
            .write()
            .await
            .cleanup_old_entries(Instant::now());
    }
}

/// Entry point of the discovery engine
pub struct Engine;

impl Engine {
    /// Poll the collector once and start one task per local interface.
    ///
    /// Frames to transmit are queued on `outbound`.
    pub async fn start(
        config: EngineConfig,
        collector: Arc<dyn CapabilityCollector>,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Result<EngineHandle, EngineError> {
        let dedup = Arc::new(MemoryDedup::new(config.dedup_retention));
        Self::start_with_dedup(config, collector, dedup, outbound).await
    }

    /// Like [`Engine::start`] with a caller supplied de-duplication store
    pub async fn start_with_dedup(
        config: EngineConfig,
        collector: Arc<dyn CapabilityCollector>,
        dedup: Arc<dyn Dedup>,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Result<EngineHandle, EngineError> {
        config.validate()?;
        let interfaces = collector.local_interfaces().await?;
        let radios = collector.radio_inventory().await?;
        info!(
            "Starting 1905 engine for AL {} with {} interfaces and {} radios",
            config.al_mac,
            interfaces.len(),
            radios.len()
        );

        let shared = Arc::new(Shared {
            framer: Framer::new(config.max_payload),
            topology: RwLock::new(TopologyDatabase::new(config.al_mac, config.neighbor_expiry)),
            next_mid: AtomicU16::new(rand::random()),
            config,
            dedup,
            collector,
            outbound,
            inventory: RwLock::new(Inventory::default()),
            interfaces: RwLock::new(BTreeMap::new()),
            links: Mutex::new(HashMap::new()),
            housekeeping: Mutex::new(None),
        });

        let handle = EngineHandle { shared };
        handle.apply_inventory(interfaces, radios).await;
        let task = tokio::spawn(housekeeping(
            Arc::downgrade(&handle.shared),
            handle.shared.config.sweep_interval,
        ));
        *handle.shared.housekeeping.lock().await = Some(task);
        Ok(handle)
    }
}

/// Handle to a running engine.
///
/// Interface tasks only hold the engine state weakly: dropping the last
/// handle stops them as if [`EngineHandle::shutdown`] had been called.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    /// Our AL address
    pub fn al_mac(&self) -> MacAddr {
        self.shared.config.al_mac
    }

    /// Hand a frame received on `interface` to its task
    pub async fn deliver(&self, interface: MacAddr, frame: Frame) -> Result<(), EngineError> {
        let interfaces = self.shared.interfaces.read().await;
        let handle = interfaces
            .get(&interface)
            .ok_or(EngineError::UnknownInterface(interface))?;
        handle
            .events
            .send(InterfaceEvent::Frame {
                frame,
                received: Instant::now(),
            })
            .map_err(|_| EngineError::Stopped(interface))
    }

    /// Signal an externally detected topology change
    pub async fn topology_changed(&self) {
        info!("Local topology changed");
        self.shared.notify_all().await;
    }

    /// Send a discovery on `interface` now and restart its schedule
    pub async fn announce_now(&self, interface: MacAddr) -> Result<(), EngineError> {
        let interfaces = self.shared.interfaces.read().await;
        let handle = interfaces
            .get(&interface)
            .ok_or(EngineError::UnknownInterface(interface))?;
        handle
            .events
            .send(InterfaceEvent::AnnounceNow)
            .map_err(|_| EngineError::Stopped(interface))
    }

    /// Poll the collector again and reconcile the interface tasks.
    ///
    /// New interfaces start announcing immediately; vanished ones are
    /// stopped with their neighbor tables. A changed interface set is
    /// notified on every remaining interface.
    pub async fn refresh_inventory(&self) -> Result<(), EngineError> {
        let interfaces = self.shared.collector.local_interfaces().await?;
        let radios = self.shared.collector.radio_inventory().await?;
        if self.apply_inventory(interfaces, radios).await {
            self.shared.notify_all().await;
        }
        Ok(())
    }

    /// Install a new inventory; returns whether the interface set changed
    async fn apply_inventory(
        &self,
        mut records: Vec<LocalInterfaceRecord>,
        radios: RadioInventory,
    ) -> bool {
        let mut seen = Vec::with_capacity(records.len());
        records.retain(|r| {
            if seen.contains(&r.mac) {
                warn!("Ignoring duplicate interface {}", r.mac);
                false
            } else {
                seen.push(r.mac);
                true
            }
        });

        let removed = {
            let mut inventory = self.shared.inventory.write().await;
            let mut interfaces = self.shared.interfaces.write().await;

            let stale: Vec<MacAddr> = interfaces
                .keys()
                .filter(|mac| !seen.contains(mac))
                .copied()
                .collect();
            let removed: Vec<(MacAddr, InterfaceHandle)> = stale
                .into_iter()
                .filter_map(|mac| interfaces.remove(&mac).map(|h| (mac, h)))
                .collect();

            let mut added = 0;
            for record in &records {
                if !interfaces.contains_key(&record.mac) {
                    info!(iface = %record.mac, "Adding {} interface", record.media_type);
                    interfaces.insert(record.mac, spawn_interface(&self.shared, record.mac));
                    added += 1;
                }
            }

            inventory.interfaces = records;
            inventory.radios = radios;
            if added > 0 || !removed.is_empty() {
                Some(removed)
            } else {
                None
            }
        };

        match removed {
            Some(removed) => {
                for (mac, _) in &removed {
                    info!(iface = %mac, "Removing interface");
                }
                stop_interfaces(&self.shared, removed).await;
                true
            }
            None => false,
        }
    }

    /// Stop the task of `interface` and drop it from the advertised inventory.
    ///
    /// The next [`EngineHandle::refresh_inventory`] brings it back if the
    /// collector still reports it.
    pub async fn remove_interface(&self, interface: MacAddr) -> Result<(), EngineError> {
        let handle = {
            let mut inventory = self.shared.inventory.write().await;
            let mut interfaces = self.shared.interfaces.write().await;
            let handle = interfaces
                .remove(&interface)
                .ok_or(EngineError::UnknownInterface(interface))?;
            inventory.interfaces.retain(|r| r.mac != interface);
            handle
        };
        info!(iface = %interface, "Removing interface");
        stop_interfaces(&self.shared, vec![(interface, handle)]).await;
        self.shared.notify_all().await;
        Ok(())
    }

    /// Current neighbors of `interface`
    pub async fn neighbors(&self, interface: MacAddr) -> Result<Vec<NeighborEntry>, EngineError> {
        let interfaces = self.shared.interfaces.read().await;
        let handle = interfaces
            .get(&interface)
            .ok_or(EngineError::UnknownInterface(interface))?;
        let table = handle.neighbors.read().await;
        Ok(table.iter().cloned().collect())
    }

    /// Local interfaces in collector order
    pub async fn interfaces(&self) -> Vec<LocalInterfaceRecord> {
        self.shared.inventory.read().await.interfaces.clone()
    }

    /// Remote devices learned from topology responses
    pub async fn topology_snapshot(&self) -> Vec<DeviceRecord> {
        self.shared.topology.read().await.snapshot()
    }

    /// Topology database statistics
    pub async fn topology_stats(&self) -> TopologyStats {
        self.shared.topology.read().await.get_stats()
    }

    /// Contents of the topology response we would send now
    pub async fn topology_response(&self) -> Vec<Tlv> {
        self.shared.response_tlvs().await
    }

    /// Stop every task; pending reassembly buffers are discarded
    pub async fn shutdown(&self) {
        info!("Shutting down 1905 engine");
        if let Some(task) = self.shared.housekeeping.lock().await.take() {
            task.abort();
        }
        let handles: Vec<(MacAddr, InterfaceHandle)> = {
            let mut interfaces = self.shared.interfaces.write().await;
            std::mem::take(&mut *interfaces).into_iter().collect()
        };
        stop_interfaces(&self.shared, handles).await;
    }
}
