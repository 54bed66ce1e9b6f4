//! Bounds-checked byte cursors.
//!
//! [`Reader`] and [`Writer`] walk a fixed-size buffer while tracking the number
//! of bytes still available. Every access is all-or-nothing: when fewer bytes
//! remain than the field width, the call returns [`WireError::Truncated`] and
//! neither the cursor nor the buffer is touched. Multi-byte integers are
//! big-endian on the wire and are assembled byte-wise, so the buffer needs no
//! particular alignment.

use crate::error::WireError;
use crate::mac::{MacAddr, MAC_LEN};

/// Read cursor over a received buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over the whole buffer
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            remaining: buf.len(),
        }
    }

    /// Bytes still available
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Whether the reader is exhausted
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Offset of the cursor from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unread bytes, without consuming them
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..self.pos + self.remaining]
    }

    fn check(&self, width: usize) -> Result<(), WireError> {
        if self.remaining < width {
            Err(WireError::Truncated)
        } else {
            Ok(())
        }
    }

    /// Extract `n` raw bytes
    pub fn extract_n(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.check(n)?;
        let bytes = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or(WireError::Truncated)?;
        self.pos += n;
        self.remaining -= n;
        Ok(bytes)
    }

    /// Extract a fixed-width byte array
    pub fn extract_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let bytes = self.extract_n(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Extract one byte
    pub fn extract_u8(&mut self) -> Result<u8, WireError> {
        let [b] = self.extract_array::<1>()?;
        Ok(b)
    }

    /// Extract a big-endian u16
    pub fn extract_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.extract_array()?))
    }

    /// Extract a big-endian u32
    pub fn extract_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.extract_array()?))
    }

    /// Extract a hardware address
    pub fn extract_mac(&mut self) -> Result<MacAddr, WireError> {
        Ok(MacAddr(self.extract_array::<MAC_LEN>()?))
    }

    /// Split off a sub-reader over the next `n` bytes and advance past them
    pub fn take(&mut self, n: usize) -> Result<Reader<'a>, WireError> {
        self.extract_n(n).map(Reader::new)
    }
}

/// Write cursor over a fixed-capacity buffer
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
    remaining: usize,
}

impl<'a> Writer<'a> {
    /// Create a writer over the whole buffer
    pub fn new(buf: &'a mut [u8]) -> Self {
        let remaining = buf.len();
        Self {
            buf,
            pos: 0,
            remaining,
        }
    }

    /// Capacity still available
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Number of bytes written so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Insert raw bytes
    pub fn insert_n(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        let n = bytes.len();
        if self.remaining < n {
            return Err(WireError::Truncated);
        }
        let dst = self
            .buf
            .get_mut(self.pos..self.pos + n)
            .ok_or(WireError::Truncated)?;
        dst.copy_from_slice(bytes);
        self.pos += n;
        self.remaining -= n;
        Ok(())
    }

    /// Insert one byte
    pub fn insert_u8(&mut self, value: u8) -> Result<(), WireError> {
        self.insert_n(&[value])
    }

    /// Insert a big-endian u16
    pub fn insert_u16(&mut self, value: u16) -> Result<(), WireError> {
        self.insert_n(&value.to_be_bytes())
    }

    /// Insert a big-endian u32
    pub fn insert_u32(&mut self, value: u32) -> Result<(), WireError> {
        self.insert_n(&value.to_be_bytes())
    }

    /// Insert a hardware address
    pub fn insert_mac(&mut self, mac: &MacAddr) -> Result<(), WireError> {
        self.insert_n(&mac.0)
    }
}
