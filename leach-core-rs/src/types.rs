//! Base types and protocol constants

use core::fmt;
use core::str::FromStr;

use fixed::types::I16F16;
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Maximum nodes in the network, master included
pub const MAX_NODES: usize = 10;

/// Hardware address width in bytes
pub const ADDR_LEN: usize = 8;

/// Matrix index reserved for the master
pub const MASTER_INDEX: NodeIndex = 0;

/// Relays between the master and any node: everyone but those two
pub const MAX_ROUTE_LEN: usize = MAX_NODES - 2;

/// Number of cluster heads elected per cycle
pub const HEAD_COUNT: usize = 3;

/// Sequence number carried by the first HELLO of every discovery round
pub const ROUND_START_SEQUENCE: u16 = 1;

// ============================================================================
// Basic Types
// ============================================================================

/// Compact matrix index of a node (0 = master)
pub type NodeIndex = u8;

/// Link quality metric (RSSI in dBm)
pub type Metric = i16;

/// Discovery sequence number
pub type Sequence = u16;

/// Fixed-point Q16.16 for battery fractions and election values
pub type Fixed = I16F16;

/// Fixed-width hardware identifier of a node
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress(pub [u8; ADDR_LEN]);

impl NodeAddress {
    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; ADDR_LEN]) -> Self {
        Self(bytes)
    }

    /// Address whose two low bytes carry `id`, the rest zero
    pub const fn from_node_id(id: u16) -> Self {
        let id = id.to_be_bytes();
        Self([0, 0, 0, 0, 0, 0, id[0], id[1]])
    }

    /// Node id encoded in the two low bytes
    pub const fn node_id(&self) -> u16 {
        u16::from_be_bytes([self.0[ADDR_LEN - 2], self.0[ADDR_LEN - 1]])
    }

    /// Raw address bytes
    pub const fn as_bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddress({self})")
    }
}

impl FromStr for NodeAddress {
    type Err = Error;

    /// Parses up to 16 hex digits, `:` separators allowed. Short forms are
    /// left-padded, so `"2"` is node id 2.
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(|c| *c != ':').collect();
        if digits.is_empty() || digits.len() > ADDR_LEN * 2 {
            return Err(Error::InvalidArg);
        }
        let value = u64::from_str_radix(&digits, 16).map_err(|_| Error::InvalidArg)?;
        Ok(Self(value.to_be_bytes()))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(addr: NodeAddress) -> Self {
        addr.to_string()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Result type for control-plane operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error codes
///
/// Every variant is recoverable: the dispatcher logs it and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Invalid argument provided
    #[error("invalid argument")]
    InvalidArg,
    /// Routing table has no free slot
    #[error("routing table full")]
    TableFull,
    /// Address table has no free index
    #[error("node index table exhausted")]
    IndexExhausted,
    /// Address not present in the index table
    #[error("unknown node")]
    UnknownNode,
    /// No next hop toward the destination
    #[error("no route to destination")]
    NoRoute,
    /// Signal quality at or below the rejection threshold
    #[error("link quality below threshold")]
    LinkRejected,
    /// Frame length does not match its declared type
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    Malformed {
        /// Length required by the type tag
        expected: usize,
        /// Length received
        actual: usize,
    },
    /// Unrecognised type tag
    #[error("unknown frame type {0}")]
    UnknownType(u8),
    /// Election has no candidate nodes
    #[error("no election candidates")]
    NoCandidates,
    /// Radio driver failure
    #[error("radio failure")]
    Radio,
}

// ============================================================================
// Node State
// ============================================================================

/// Role of a node in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Network coordinator (matrix index 0)
    Master,
    /// Sensor node
    Member,
}

/// Discovery protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryState {
    /// Not yet part of a discovery round
    #[default]
    Idle,
    /// HELLO flood in progress
    Flooding,
    /// Topology settled, heads elected
    Stable,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Flooding => "FLOODING",
            Self::Stable => "STABLE",
        };
        f.write_str(s)
    }
}

/// Battery level as a fraction of `full_mv`, clamped to [0, 1]
pub fn battery_fraction(millivolts: i32, full_mv: i32) -> Fixed {
    if full_mv <= 0 {
        return Fixed::ONE;
    }
    let mv = millivolts.clamp(0, full_mv);
    Fixed::saturating_from_num(mv) / Fixed::saturating_from_num(full_mv)
}
