//! Per-interface protocol task.

use crate::engine::Shared;
use ieee1905_storage::MessageKey;
use ieee1905_topology::{NeighborTable, Observation};
use ieee1905_wire::{
    Cmdu, CmduHeader, Frame, MacAddr, MessageType, Reassembler, CMDU_HEADER_SIZE, MCAST_1905,
};
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Events handled by an interface task
#[derive(Debug)]
pub(crate) enum InterfaceEvent {
    /// A frame received on the interface
    Frame {
        /// The frame
        frame: Frame,
        /// When the link layer handed it over
        received: Instant,
    },
    /// Send a topology notification with this message id
    Notify {
        /// Shared by every interface of one fan-out
        message_id: u16,
    },
    /// Send a discovery now and restart the schedule
    AnnounceNow,
    /// Stop the task
    Shutdown,
}

/// What woke the task up
enum Wake {
    Announce,
    Sweep,
    Event(InterfaceEvent),
}

/// State owned by one interface task.
///
/// The task holds the engine state weakly and stops once every
/// [`EngineHandle`](crate::EngineHandle) has been dropped.
pub(crate) struct InterfaceTask {
    shared: Weak<Shared>,
    mac: MacAddr,
    neighbors: Arc<RwLock<NeighborTable>>,
    reassembler: Reassembler,
    events: mpsc::UnboundedReceiver<InterfaceEvent>,
    next_discovery: Instant,
}

/// Base period plus a uniformly random share of the jitter bound
fn jittered(base: Duration, jitter: Duration) -> Duration {
    let max = jitter.as_millis() as u64;
    if max == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=max))
}

impl InterfaceTask {
    pub(crate) fn new(
        shared: &Arc<Shared>,
        mac: MacAddr,
        neighbors: Arc<RwLock<NeighborTable>>,
        events: mpsc::UnboundedReceiver<InterfaceEvent>,
    ) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            mac,
            neighbors,
            reassembler: Reassembler::new(shared.config.reassembly_timeout),
            events,
            next_discovery: Instant::now(),
        }
    }

    /// Event loop; returns once shut down or once the engine is gone
    pub(crate) async fn run(mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        info!(iface = %self.mac, "Interface task started");
        self.announce(&shared);
        let mut sweep = interval(shared.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        drop(shared);

        loop {
            let wake = tokio::select! {
                biased;

                _ = sleep_until(self.next_discovery) => Wake::Announce,

                _ = sweep.tick() => Wake::Sweep,

                event = self.events.recv() => match event {
                    Some(InterfaceEvent::Shutdown) | None => break,
                    Some(event) => Wake::Event(event),
                },
            };
            let Some(shared) = self.shared.upgrade() else {
                break;
            };

            match wake {
                Wake::Announce | Wake::Event(InterfaceEvent::AnnounceNow) => {
                    self.announce(&shared);
                }
                Wake::Sweep => self.sweep(&shared).await,
                Wake::Event(InterfaceEvent::Frame { frame, received }) => {
                    self.handle_frame(&shared, frame, received).await;
                }
                Wake::Event(InterfaceEvent::Notify { message_id }) => {
                    let cmdu = Cmdu::topology_notification(message_id, shared.config.al_mac);
                    debug!(
                        iface = %self.mac,
                        "Sending topology notification (mid {})", message_id
                    );
                    shared.transmit(self.mac, &cmdu, MCAST_1905);
                }
                Wake::Event(InterfaceEvent::Shutdown) => break,
            }
        }

        self.reassembler.clear();
        info!(iface = %self.mac, "Interface task stopped");
    }

    /// Multicast a discovery and rearm the timer
    fn announce(&mut self, shared: &Shared) {
        let config = &shared.config;
        let message_id = shared.next_message_id();
        let cmdu = Cmdu::topology_discovery(message_id, config.al_mac, self.mac);
        debug!(iface = %self.mac, "Sending topology discovery (mid {})", message_id);
        shared.transmit(self.mac, &cmdu, MCAST_1905);
        self.next_discovery =
            Instant::now() + jittered(config.discovery_interval, config.discovery_jitter);
    }

    async fn sweep(&mut self, shared: &Shared) {
        let now = Instant::now();
        let expired: Vec<MacAddr> = self
            .neighbors
            .write()
            .await
            .expire(now, shared.config.neighbor_expiry)
            .into_iter()
            .map(|entry| entry.al_mac)
            .collect();
        if !expired.is_empty() {
            self.membership_changed(shared, None, &expired).await;
        }
        self.reassembler.expire(now.into_std());
    }

    /// Fold a change of this interface's neighbors into the AL-wide set.
    ///
    /// Notifies only when an AL shows up on its first local interface or
    /// leaves its last one, so a peer seen through several interfaces of a
    /// bridged segment yields one notification cycle.
    async fn membership_changed(
        &self,
        shared: &Shared,
        joined: Option<MacAddr>,
        left: &[MacAddr],
    ) {
        let mut changed = false;
        if let Some(al_mac) = joined {
            changed |= shared.link_up(al_mac, self.mac).await;
        }
        for al_mac in left {
            changed |= shared.link_down(*al_mac, self.mac).await;
        }
        if changed {
            shared.notify_all().await;
        }
    }

    fn send_query(&self, shared: &Shared, al_mac: MacAddr) {
        let message_id = shared.next_message_id();
        debug!(iface = %self.mac, "Querying {} (mid {})", al_mac, message_id);
        shared.transmit(self.mac, &Cmdu::topology_query(message_id), al_mac);
    }

    async fn handle_frame(&mut self, shared: &Shared, frame: Frame, received: Instant) {
        let al_mac = shared.config.al_mac;
        if frame.dst != MCAST_1905 && frame.dst != al_mac && frame.dst != self.mac {
            debug!(iface = %self.mac, "Dropping frame for {}", frame.dst);
            return;
        }
        if shared.is_local_address(frame.src).await {
            debug!(iface = %self.mac, "Dropping our own frame from {}", frame.src);
            return;
        }

        let header = match CmduHeader::split(&frame.payload) {
            Ok((header, _)) => header,
            Err(e) => {
                debug!(iface = %self.mac, "Dropping frame from {}: {}", frame.src, e);
                return;
            }
        };
        let body = frame.payload.slice(CMDU_HEADER_SIZE..);
        let whole = match self.reassembler.push(
            frame.src,
            frame.dst,
            header,
            body,
            received.into_std(),
        ) {
            Ok(Some(whole)) => whole,
            Ok(None) => return,
            Err(e) => {
                debug!(iface = %self.mac, "Discarding fragments from {}: {}", frame.src, e);
                return;
            }
        };
        let cmdu = match shared.framer.parse(&whole.header, &whole.body) {
            Ok(cmdu) => cmdu,
            Err(e) => {
                warn!(
                    iface = %self.mac,
                    "Malformed {:?} from {}: {}", whole.header.message_type, frame.src, e
                );
                return;
            }
        };

        // discoveries are per link and idempotent; a bridged segment may
        // deliver the same one to several local interfaces
        if cmdu.message_type == MessageType::TopologyDiscovery {
            self.on_discovery(shared, &cmdu).await;
            return;
        }

        let key = MessageKey::new(frame.src, cmdu.message_id);
        match shared.dedup.try_mark(key).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(iface = %self.mac, "Duplicate {:?} {}", cmdu.message_type, key);
                return;
            }
            Err(e) => {
                warn!(iface = %self.mac, "De-duplication failed for {}: {}", key, e);
                return;
            }
        }

        if cmdu.relay && frame.dst == MCAST_1905 && shared.config.relay_multicast {
            shared.relay(self.mac, &cmdu, frame.src).await;
        }

        match cmdu.message_type {
            MessageType::TopologyDiscovery => {}
            MessageType::TopologyNotification => self.on_notification(shared, &cmdu),
            MessageType::TopologyQuery => self.on_query(shared, &cmdu, frame.src, received).await,
            MessageType::TopologyResponse => self.on_response(shared, &cmdu, frame.src).await,
        }
    }

    async fn on_discovery(&mut self, shared: &Shared, cmdu: &Cmdu) {
        let (Some(al_mac), Some(iface_mac)) = (cmdu.al_mac(), cmdu.interface_mac()) else {
            return;
        };
        if al_mac == shared.config.al_mac {
            debug!(iface = %self.mac, "Ignoring discovery carrying our AL address");
            return;
        }

        let observation = self.neighbors.write().await.observe_discovery(
            al_mac,
            iface_mac,
            cmdu.message_id,
            Instant::now(),
        );
        let left = match observation {
            Observation::Refreshed => return,
            Observation::NewPeer => None,
            Observation::ChangedPeer { previous } => Some(previous),
        };

        self.send_query(shared, al_mac);
        self.membership_changed(shared, Some(al_mac), left.as_slice())
            .await;
        if shared.config.fast_discovery {
            self.announce(shared);
        }
    }

    fn on_notification(&self, shared: &Shared, cmdu: &Cmdu) {
        match cmdu.al_mac() {
            Some(al_mac) if al_mac != shared.config.al_mac => {
                debug!(iface = %self.mac, "Topology of {} changed", al_mac);
                self.send_query(shared, al_mac);
            }
            _ => {}
        }
    }

    async fn on_query(&self, shared: &Shared, cmdu: &Cmdu, src: MacAddr, received: Instant) {
        let tlvs = shared.response_tlvs().await;
        let response = Cmdu::topology_response(cmdu.message_id, tlvs);
        shared.transmit(self.mac, &response, src);

        let elapsed = received.elapsed();
        if elapsed > shared.config.response_budget {
            warn!(
                iface = %self.mac,
                "Topology response to {} (mid {}) took {:?}", src, cmdu.message_id, elapsed
            );
        } else {
            debug!(
                iface = %self.mac,
                "Answered topology query from {} (mid {})", src, cmdu.message_id
            );
        }
    }

    async fn on_response(&self, shared: &Shared, cmdu: &Cmdu, src: MacAddr) {
        let Some(info) = cmdu.device_information() else {
            return;
        };
        if info.al_mac == shared.config.al_mac {
            return;
        }
        let now = Instant::now();
        shared
            .topology
            .write()
            .await
            .process_response(self.mac, cmdu, now);

        // only a device answering from one of its own addresses is adjacent
        let direct = src == info.al_mac || info.interfaces.iter().any(|i| i.mac == src);
        if !direct {
            return;
        }
        let observation = self
            .neighbors
            .write()
            .await
            .observe_response(info.al_mac, cmdu.message_id, now);
        if observation.is_membership_change() {
            self.membership_changed(shared, Some(info.al_mac), &[]).await;
        }
    }
}
