//! # leach-core: Cluster-Head Control Plane for Small Sensor Networks
//!
//! A LEACH-style control plane for a single-master wireless sensor
//! network of up to [`MAX_NODES`] nodes.
//!
//! ## Protocol Outline
//!
//! ### 1. Discovery
//!
//! The master floods HELLO frames. Every member records the sender and the
//! master, re-floods once per round and answers with a REPORT carrying its
//! local routing table. The master folds the reports into a symmetric
//! adjacency matrix.
//!
//! ### 2. Election
//!
//! Once a configured number of HELLO rounds pass without a new node the
//! network is stable. The master scores 1/2/3-hop reachability weighted by
//! battery, picks three cluster heads, assigns every other node to a head
//! and derives a loop-free route tree.
//!
//! ### 3. Advertisement
//!
//! Each node receives an ADVERTISE frame carrying its head and uplink and
//! installs it as its permanent route toward the master.
//!
//! ### 4. Liveness
//!
//! Members send heartbeats and sensor data master-ward. A node that stays
//! silent for the configured tolerance, or a NEW_NODE announcement, sends
//! the whole network back to discovery.
//!
//! ## Quick Start
//!
//! ```ignore
//! use leach_core::prelude::*;
//!
//! let mut master = Node::master(NodeAddress::from_node_id(1), NodeConfig::default());
//! master.start();
//!
//! // timer service
//! master.on_hello_timer(&mut radio)?;
//!
//! // radio receive callback
//! master.handle_frame(&mut radio, &frame)?;
//!
//! for event in master.drain_events() {
//!     println!("{event}");
//! }
//! ```

#![warn(missing_docs)]

// Core modules
pub mod types;
pub mod config;
pub mod matrix;
pub mod adjacency;
pub mod election;
pub mod grouping;
pub mod routing;
pub mod packet;
pub mod radio;
pub mod discovery;
pub mod heartbeat;
pub mod sensor;
pub mod status;
pub mod node;

// Re-exports for convenience
pub use types::*;
pub use config::NodeConfig;
pub use matrix::{k_hop_reachability, multiply, HopMatrix};
pub use adjacency::{AdjacencyMatrix, NodeIndexTable, NO_LINK, SELF_LINK};
pub use election::{choose_cluster_heads, Assignment, ElectionResult, HeadSelection};
pub use grouping::{assign_groups, build_route_tree, Grouping, RouteTree, Uplink};
pub use routing::{PatchOutcome, RoutingEntry, RoutingTable, TableKind};
pub use packet::{Advertise, Frame, FrameType, Heartbeat, Hello, NewNode, Report, SensorData, Wire};
pub use radio::{InboundFrame, Outbound, Radio, RecordingRadio};
pub use discovery::{Discovery, HelloTick, HelloVerdict};
pub use heartbeat::LivenessMonitor;
pub use sensor::{SensorReading, SensorSampler, Sensors};
pub use status::{ResetReason, StatusEvent};
pub use node::Node;

/// Prelude - commonly used items
pub mod prelude {
    pub use crate::types::*;
    pub use crate::config::NodeConfig;
    pub use crate::node::Node;
    pub use crate::radio::{InboundFrame, Radio};
    pub use crate::routing::TableKind;
    pub use crate::sensor::Sensors;
    pub use crate::status::StatusEvent;
}

// ============================================================================
// Version
// ============================================================================

/// Version string
pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");
