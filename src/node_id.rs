//! Node identifiers.
//!
//! Each node has a stable 16-bit identifier derived from its link-layer
//! address (two bytes packed big-endian, matching the `RIME_ID` macro of the
//! original implementation). `0` is reserved for "undefined parent"; `0xFFFF`
//! is the root's own "parent" sentinel.

use std::fmt;

/// A node's 16-bit mesh identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u16);

impl NodeId {
    /// Sentinel meaning "no parent chosen yet".
    pub const UNDEFINED: NodeId = NodeId(0);
    /// Sentinel a root publishes as its own parent.
    pub const ROOT_SENTINEL: NodeId = NodeId(0xFFFF);

    /// Pack a two-byte big-endian link-layer address into an id.
    pub fn from_link_addr(bytes: [u8; 2]) -> NodeId {
        NodeId(u16::from_be_bytes(bytes))
    }

    pub fn is_undefined(self) -> bool {
        self == NodeId::UNDEFINED
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for NodeId {
    fn from(value: u16) -> Self {
        NodeId(value)
    }
}
