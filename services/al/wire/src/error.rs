//! Wire protocol error types.

use thiserror::Error;

/// Which catalogue an unrecognised type tag belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// TLV type octet
    Tlv,
    /// CMDU message type
    Message,
}

/// Wire protocol errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Not enough bytes to complete a field
    #[error("truncated")]
    Truncated,

    /// Declared lengths or counts are internally inconsistent
    #[error("malformed: {0}")]
    Malformed(&'static str),

    /// Type tag outside the recognised catalogue
    #[error("unknown {kind:?} type {value:#06x}")]
    UnknownType {
        /// Catalogue the tag was looked up in
        kind: TypeKind,
        /// Raw tag value
        value: u16,
    },

    /// Reassembly deadline exceeded
    #[error("reassembly timeout")]
    Timeout,

    /// Unsupported message version
    #[error("version unsupported: {0}")]
    Version(u8),

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Field value with no canonical encoding
    #[error("invalid field: {0}")]
    Invalid(&'static str),
}

impl WireError {
    /// Whether this error is a skippable unknown TLV
    pub fn is_unknown_tlv(&self) -> bool {
        matches!(
            self,
            WireError::UnknownType {
                kind: TypeKind::Tlv,
                ..
            }
        )
    }
}
