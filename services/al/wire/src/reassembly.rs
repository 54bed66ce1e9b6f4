//! Fragment reassembly.
//!
//! Fragments are grouped by (source, destination, message id) and released
//! in fragment-index order once the last fragment and every index before it
//! have arrived. Incomplete messages are discarded by [`Reassembler::expire`].

use crate::cmdu::{CmduFlags, CmduHeader};
use crate::error::WireError;
use crate::mac::MacAddr;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time a partial message is held
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on the reassembled TLV bytes of one message
pub const MAX_REASSEMBLED_SIZE: usize = 64 * 1024;

/// Default number of partial messages held at once
pub const DEFAULT_MAX_PENDING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    src: MacAddr,
    dst: MacAddr,
    message_id: u16,
}

#[derive(Debug)]
struct Pending {
    first: CmduHeader,
    first_seen: Instant,
    fragments: BTreeMap<u8, Bytes>,
    last_index: Option<u8>,
    size: usize,
}

impl Pending {
    fn is_complete(&self) -> bool {
        match self.last_index {
            Some(last) => self.fragments.len() == last as usize + 1,
            None => false,
        }
    }
}

/// A message whose fragments have all arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembled {
    /// Header of the first fragment, flagged as the only fragment
    pub header: CmduHeader,
    /// Concatenated TLV bytes
    pub body: Bytes,
}

/// Per-interface reassembly buffer
#[derive(Debug)]
pub struct Reassembler {
    pending: HashMap<Key, Pending>,
    timeout: Duration,
    max_pending: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_REASSEMBLY_TIMEOUT)
    }
}

impl Reassembler {
    /// Create a reassembler with the given timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            timeout,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Limit the number of partial messages held at once
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Number of partial messages held
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Add one fragment.
    ///
    /// Returns the whole message once its last missing fragment arrives.
    pub fn push(
        &mut self,
        src: MacAddr,
        dst: MacAddr,
        header: CmduHeader,
        body: Bytes,
        now: Instant,
    ) -> Result<Option<Reassembled>, WireError> {
        if header.fragment_id == 0 && header.is_last_fragment() {
            return Ok(Some(Reassembled {
                header: whole(header),
                body,
            }));
        }

        let key = Key {
            src,
            dst,
            message_id: header.message_id,
        };
        if !self.pending.contains_key(&key) && self.pending.len() >= self.max_pending {
            self.evict_oldest();
        }
        let entry = self.pending.entry(key).or_insert_with(|| Pending {
            first: header,
            first_seen: now,
            fragments: BTreeMap::new(),
            last_index: None,
            size: 0,
        });

        if entry.first.message_type != header.message_type {
            self.pending.remove(&key);
            return Err(WireError::Malformed("fragment message type mismatch"));
        }
        if let Some(last) = entry.last_index {
            if header.fragment_id > last {
                self.pending.remove(&key);
                return Err(WireError::Malformed("fragment after last fragment"));
            }
        }
        if header.is_last_fragment() {
            if entry.fragments.keys().any(|index| *index > header.fragment_id) {
                self.pending.remove(&key);
                return Err(WireError::Malformed("fragment after last fragment"));
            }
            entry.last_index = Some(header.fragment_id);
        }
        if header.fragment_id == 0 {
            entry.first = header;
        }
        if entry.fragments.contains_key(&header.fragment_id) {
            // repeated fragment, keep the first copy
            return Ok(None);
        }
        entry.size += body.len();
        if entry.size > MAX_REASSEMBLED_SIZE {
            let size = entry.size;
            self.pending.remove(&key);
            return Err(WireError::Size(size));
        }
        entry.fragments.insert(header.fragment_id, body);

        if !entry.is_complete() {
            return Ok(None);
        }
        let done = match self.pending.remove(&key) {
            Some(done) => done,
            None => return Ok(None),
        };
        let mut body = BytesMut::with_capacity(done.size);
        for fragment in done.fragments.values() {
            body.extend_from_slice(fragment);
        }
        Ok(Some(Reassembled {
            header: whole(done.first),
            body: body.freeze(),
        }))
    }

    /// Drop partial messages older than the timeout; returns how many
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.pending.len();
        self.pending.retain(|key, pending| {
            let keep = now.saturating_duration_since(pending.first_seen) < timeout;
            if !keep {
                debug!(
                    src = %key.src,
                    mid = key.message_id,
                    received = pending.fragments.len(),
                    error = %WireError::Timeout,
                    "Discarding incomplete CMDU"
                );
            }
            keep
        });
        before - self.pending.len()
    }

    /// Drop every partial message
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, pending)| pending.first_seen)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            self.pending.remove(&key);
        }
    }
}

fn whole(mut header: CmduHeader) -> CmduHeader {
    header.fragment_id = 0;
    header.flags |= CmduFlags::LAST_FRAGMENT;
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmdu::{Cmdu, MessageType};
    use crate::framer::Framer;
    use crate::tlv::{NeighborDevice, NeighborDeviceList, Tlv};

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0x02, 0, 0, 0, 0, last)
    }

    fn fragmented() -> (Cmdu, Vec<Bytes>) {
        let tlvs = (0..6)
            .map(|i| {
                Tlv::NeighborDeviceList(NeighborDeviceList {
                    local_mac: mac(i),
                    neighbors: (0..30)
                        .map(|n| NeighborDevice {
                            mac: MacAddr::new(0x02, 1, i, 0, 0, n),
                            bridge: false,
                        })
                        .collect(),
                })
            })
            .collect();
        let cmdu = Cmdu::topology_response(77, tlvs);
        let payloads = Framer::new(600).serialize(&cmdu).unwrap();
        assert!(payloads.len() >= 3);
        (cmdu, payloads)
    }

    fn split(payload: &Bytes) -> (CmduHeader, Bytes) {
        let (header, _) = CmduHeader::split(payload).unwrap();
        (header, payload.slice(8..))
    }

    #[test]
    fn test_single_fragment_passes_through() {
        let mut reassembler = Reassembler::default();
        let payload = Framer::default()
            .serialize(&Cmdu::topology_query(1))
            .unwrap()
            .remove(0);
        let (header, body) = split(&payload);
        let done = reassembler
            .push(mac(1), mac(2), header, body.clone(), Instant::now())
            .unwrap()
            .unwrap();
        assert_eq!(done.body, body);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_out_of_order_fragments_reassemble() {
        let (cmdu, payloads) = fragmented();
        let mut reassembler = Reassembler::default();
        let now = Instant::now();

        let mut order: Vec<usize> = (0..payloads.len()).rev().collect();
        let first = order.remove(0);
        order.push(first);

        let mut result = None;
        for index in order {
            let (header, body) = split(&payloads[index]);
            if let Some(done) = reassembler.push(mac(1), mac(2), header, body, now).unwrap() {
                result = Some(done);
            }
        }
        let done = result.unwrap();
        assert_eq!(done.header.message_type, MessageType::TopologyResponse);
        assert!(done.header.is_last_fragment());
        let parsed = Framer::default().parse(&done.header, &done.body).unwrap();
        assert_eq!(parsed, cmdu);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_duplicate_fragment_is_ignored() {
        let (_, payloads) = fragmented();
        let mut reassembler = Reassembler::default();
        let now = Instant::now();
        let (header, body) = split(&payloads[0]);
        assert!(reassembler
            .push(mac(1), mac(2), header, body.clone(), now)
            .unwrap()
            .is_none());
        assert!(reassembler
            .push(mac(1), mac(2), header, body, now)
            .unwrap()
            .is_none());
        assert_eq!(reassembler.pending(), 1);
    }

    #[test]
    fn test_missing_fragment_expires() {
        let (_, payloads) = fragmented();
        let mut reassembler = Reassembler::new(Duration::from_secs(3));
        let start = Instant::now();
        for payload in payloads.iter().skip(1) {
            let (header, body) = split(payload);
            assert!(reassembler
                .push(mac(1), mac(2), header, body, start)
                .unwrap()
                .is_none());
        }
        assert_eq!(reassembler.expire(start + Duration::from_secs(2)), 0);
        assert_eq!(reassembler.expire(start + Duration::from_secs(3)), 1);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_senders_are_kept_apart() {
        let (_, payloads) = fragmented();
        let mut reassembler = Reassembler::default();
        let now = Instant::now();
        let (h0, b0) = split(&payloads[0]);
        reassembler.push(mac(1), mac(9), h0, b0.clone(), now).unwrap();
        reassembler.push(mac(2), mac(9), h0, b0, now).unwrap();
        assert_eq!(reassembler.pending(), 2);
    }

    #[test]
    fn test_pending_limit_evicts_oldest() {
        let mut reassembler = Reassembler::default().with_max_pending(2);
        let start = Instant::now();
        let header = CmduHeader {
            message_type: MessageType::TopologyResponse,
            message_id: 0,
            fragment_id: 0,
            flags: CmduFlags::empty(),
        };
        for mid in 0..3u16 {
            let header = CmduHeader {
                message_id: mid,
                ..header
            };
            let at = start + Duration::from_millis(mid as u64);
            reassembler
                .push(mac(1), mac(2), header, Bytes::from_static(&[1]), at)
                .unwrap();
        }
        assert_eq!(reassembler.pending(), 2);
        // the oldest (mid 0) went first
        assert_eq!(reassembler.expire(start + Duration::from_millis(3000)), 0);
        assert_eq!(reassembler.expire(start + Duration::from_millis(3002)), 2);
    }

    #[test]
    fn test_fragment_beyond_last_is_malformed() {
        let mut reassembler = Reassembler::default();
        let now = Instant::now();
        let last = CmduHeader {
            message_type: MessageType::TopologyResponse,
            message_id: 5,
            fragment_id: 1,
            flags: CmduFlags::LAST_FRAGMENT,
        };
        reassembler
            .push(mac(1), mac(2), last, Bytes::from_static(&[1]), now)
            .unwrap();
        let beyond = CmduHeader {
            fragment_id: 2,
            flags: CmduFlags::empty(),
            ..last
        };
        assert!(matches!(
            reassembler.push(mac(1), mac(2), beyond, Bytes::from_static(&[2]), now),
            Err(WireError::Malformed(_))
        ));
        assert_eq!(reassembler.pending(), 0);
    }
}
