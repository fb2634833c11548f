//! Status lines for the monitoring GUI
//!
//! One event per line, whitespace-delimited, keyword first:
//!
//! ```text
//! STATE FLOODING
//! LINK 1 3 -62
//! HEAD 2
//! MEMBER 4 2
//! ROUTE 4 2 2
//! SENSOR 4 21 340 35 88
//! DEAD 3
//! RESET heartbeat
//! ```

use core::fmt;

use crate::types::*;

/// Why discovery was restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Initial start
    Startup,
    /// A node missed too many heartbeats
    Heartbeat,
    /// A node announced itself
    NewNode,
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Startup => "startup",
            Self::Heartbeat => "heartbeat",
            Self::NewNode => "new-node",
        })
    }
}

/// Something the GUI wants to know about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Discovery state changed
    State(DiscoveryState),
    /// Link between two indices recorded or changed
    Link {
        /// One end
        a: NodeIndex,
        /// Other end
        b: NodeIndex,
        /// RSSI
        metric: Metric,
    },
    /// Node elected head
    Head(NodeIndex),
    /// Node assigned to a head
    Member {
        /// Node
        node: NodeIndex,
        /// Its head
        head: NodeIndex,
    },
    /// Permanent route installed at the master
    Route {
        /// Destination
        dest: NodeIndex,
        /// First hop
        next: NodeIndex,
        /// Hops
        hops: u8,
    },
    /// Sensor report received
    Sensor {
        /// Reporting node
        node: NodeIndex,
        /// Degrees C
        temperature: i32,
        /// Lux
        light: i32,
        /// Cm
        distance: i32,
        /// Battery percent
        battery_pct: u8,
    },
    /// Node declared dead by the liveness monitor
    Dead(NodeIndex),
    /// Discovery restarted
    Reset(ResetReason),
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::State(s) => write!(f, "STATE {s}"),
            Self::Link { a, b, metric } => write!(f, "LINK {a} {b} {metric}"),
            Self::Head(n) => write!(f, "HEAD {n}"),
            Self::Member { node, head } => write!(f, "MEMBER {node} {head}"),
            Self::Route { dest, next, hops } => write!(f, "ROUTE {dest} {next} {hops}"),
            Self::Sensor {
                node,
                temperature,
                light,
                distance,
                battery_pct,
            } => write!(f, "SENSOR {node} {temperature} {light} {distance} {battery_pct}"),
            Self::Dead(n) => write!(f, "DEAD {n}"),
            Self::Reset(reason) => write!(f, "RESET {reason}"),
        }
    }
}
