//! CMDU framing and fragmentation.
//!
//! A serialized CMDU is a header followed by its TLVs and the end of message
//! marker. When that does not fit in one frame, the TLVs are spread over
//! several fragments sharing the message id; fragments are cut only between
//! TLVs and the marker travels in the last one, so the concatenated fragment
//! bodies are byte-identical to the unfragmented body.

use crate::cmdu::{Cmdu, CmduFlags, CmduHeader, CMDU_HEADER_SIZE};
use crate::cursor::Reader;
use crate::error::WireError;
use crate::mac::{MacAddr, MAC_LEN};
use crate::tlv::{RawTlv, Tlv, TLV_HEADER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// EtherType of IEEE 1905.1 frames
pub const ETHERTYPE_1905: u16 = 0x893a;

/// Ethernet header: destination, source, EtherType
pub const ETH_HEADER_SIZE: usize = 2 * MAC_LEN + 2;

/// Maximum CMDU bytes (header plus TLVs) per frame
pub const MAX_CMDU_PAYLOAD: usize = 1500;

/// Most fragments a single message id can span
pub const MAX_FRAGMENTS: usize = 256;

/// A link-layer frame carrying one CMDU fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination hardware address
    pub dst: MacAddr,
    /// Source hardware address
    pub src: MacAddr,
    /// CMDU header and TLV bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(dst: MacAddr, src: MacAddr, payload: Bytes) -> Self {
        Self { dst, src, payload }
    }

    /// Decode the CMDU header of the payload
    pub fn header(&self) -> Result<CmduHeader, WireError> {
        CmduHeader::split(&self.payload).map(|(header, _)| header)
    }

    /// Encode as an Ethernet II frame
    pub fn to_ethernet(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ETH_HEADER_SIZE + self.payload.len());
        buf.put_slice(&self.dst.0);
        buf.put_slice(&self.src.0);
        buf.put_u16(ETHERTYPE_1905);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode an Ethernet II frame carrying a 1905 payload
    pub fn from_ethernet(raw: Bytes) -> Result<Self, WireError> {
        let mut r = Reader::new(&raw);
        let dst = r.extract_mac()?;
        let src = r.extract_mac()?;
        let ethertype = r.extract_u16()?;
        if ethertype != ETHERTYPE_1905 {
            return Err(WireError::Malformed("not a 1905 ethertype"));
        }
        let payload = raw.slice(ETH_HEADER_SIZE..);
        Ok(Self { dst, src, payload })
    }
}

/// Serializes CMDUs into fragment payloads and parses reassembled bodies
#[derive(Debug, Clone, Copy)]
pub struct Framer {
    max_payload: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(MAX_CMDU_PAYLOAD)
    }
}

impl Framer {
    /// Framer with the given per-frame CMDU capacity
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Per-frame CMDU capacity
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Serialize a CMDU into one payload per fragment
    pub fn serialize(&self, cmdu: &Cmdu) -> Result<Vec<Bytes>, WireError> {
        let capacity = self
            .max_payload
            .checked_sub(CMDU_HEADER_SIZE)
            .filter(|c| *c >= TLV_HEADER_SIZE)
            .ok_or(WireError::Size(self.max_payload))?;
        let eom = Tlv::EndOfMessage.encode()?;

        let mut fragments: Vec<Vec<u8>> = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        for tlv in &cmdu.tlvs {
            let encoded = tlv.encode()?;
            if encoded.len() > capacity {
                return Err(WireError::Size(encoded.len()));
            }
            if current.len() + encoded.len() > capacity {
                fragments.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(&encoded);
        }
        if current.len() + eom.len() > capacity {
            fragments.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(&eom);
        fragments.push(current);

        if fragments.len() > MAX_FRAGMENTS {
            return Err(WireError::Size(fragments.len()));
        }

        let last = fragments.len() - 1;
        let mut payloads = Vec::with_capacity(fragments.len());
        for (index, body) in fragments.into_iter().enumerate() {
            let mut flags = CmduFlags::empty();
            if index == last {
                flags |= CmduFlags::LAST_FRAGMENT;
            }
            if cmdu.relay {
                flags |= CmduFlags::RELAY;
            }
            let header = CmduHeader {
                message_type: cmdu.message_type,
                message_id: cmdu.message_id,
                fragment_id: index as u8,
                flags,
            };
            let mut buf = BytesMut::with_capacity(CMDU_HEADER_SIZE + body.len());
            buf.put_slice(&header.to_bytes()?);
            buf.put_slice(&body);
            payloads.push(buf.freeze());
        }
        Ok(payloads)
    }

    /// Serialize a CMDU into addressed frames
    pub fn frames(&self, cmdu: &Cmdu, dst: MacAddr, src: MacAddr) -> Result<Vec<Frame>, WireError> {
        Ok(self
            .serialize(cmdu)?
            .into_iter()
            .map(|payload| Frame::new(dst, src, payload))
            .collect())
    }

    /// Parse the reassembled TLV bytes of a message.
    ///
    /// Unknown TLVs are skipped. Scanning stops at the end of message marker
    /// and ignores anything after it, such as link-layer padding.
    pub fn parse(&self, header: &CmduHeader, body: &[u8]) -> Result<Cmdu, WireError> {
        let mut r = Reader::new(body);
        let mut tlvs = Vec::new();
        loop {
            if r.is_empty() {
                return Err(WireError::Malformed("missing end of message tlv"));
            }
            let raw = RawTlv::read(&mut r)?;
            match Tlv::from_raw(&raw) {
                Ok(Tlv::EndOfMessage) => break,
                Ok(tlv) => tlvs.push(tlv),
                Err(e) if e.is_unknown_tlv() => {
                    debug!(
                        tlv_type = raw.tlv_type,
                        len = raw.body.len(),
                        "Skipping unknown TLV"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        let cmdu = Cmdu::new(
            header.message_type,
            header.message_id,
            header.is_relay(),
            tlvs,
        );
        cmdu.validate()?;
        Ok(cmdu)
    }

    /// Parse a self-contained, unfragmented payload
    pub fn parse_payload(&self, payload: &[u8]) -> Result<Cmdu, WireError> {
        let (header, body) = CmduHeader::split(payload)?;
        if header.fragment_id != 0 || !header.is_last_fragment() {
            return Err(WireError::Malformed("payload is a partial fragment"));
        }
        self.parse(&header, body)
    }
}
