//! Liveness Monitor
//!
//! The master keeps one miss counter per node index. Every monitor tick
//! bumps the counter of each node known to the network; any frame from a
//! node clears its counter. A counter reaching the tolerance means the
//! topology is no longer trustworthy and discovery must start over.

use tracing::warn;

use crate::types::*;

// ============================================================================
// Configuration
// ============================================================================

/// Default silent ticks before instability
pub const DEFAULT_TOLERANCE: u8 = 3;

// ============================================================================
// Node Tracking
// ============================================================================

/// Per-node miss counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatRecord {
    /// Part of the current topology
    pub known: bool,
    /// Consecutive ticks without traffic
    pub missed: u8,
}

// ============================================================================
// Monitor
// ============================================================================

/// Miss counters for every node index
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    records: [HeartbeatRecord; MAX_NODES],
    tolerance: u8,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl LivenessMonitor {
    /// Create a monitor; a tolerance of 0 is treated as 1
    pub fn new(tolerance: u8) -> Self {
        Self {
            records: [HeartbeatRecord::default(); MAX_NODES],
            tolerance: tolerance.max(1),
        }
    }

    /// Start watching `node`; the master itself is never watched
    pub fn mark_known(&mut self, node: NodeIndex) {
        if node == MASTER_INDEX {
            return;
        }
        if let Some(r) = self.records.get_mut(node as usize) {
            r.known = true;
        }
    }

    /// Traffic from `node` was seen
    pub fn heard(&mut self, node: NodeIndex) {
        if let Some(r) = self.records.get_mut(node as usize) {
            r.missed = 0;
        }
    }

    /// Zero every counter, keep the known set
    pub fn clear_counters(&mut self) {
        for r in self.records.iter_mut() {
            r.missed = 0;
        }
    }

    /// Forget the known set and zero every counter
    pub fn forget_all(&mut self) {
        self.records = [HeartbeatRecord::default(); MAX_NODES];
    }

    /// One monitor period
    ///
    /// Increments the counter of every known node and returns the first
    /// node whose counter reached the tolerance. On instability all
    /// counters are cleared.
    pub fn tick(&mut self) -> Option<NodeIndex> {
        let mut dead = None;
        for (idx, r) in self.records.iter_mut().enumerate() {
            if !r.known {
                continue;
            }
            r.missed = r.missed.saturating_add(1);
            if dead.is_none() && r.missed >= self.tolerance {
                dead = Some(idx as NodeIndex);
            }
        }
        if let Some(node) = dead {
            warn!(node, tolerance = self.tolerance, "node silent, topology unstable");
            self.clear_counters();
        }
        dead
    }

    /// Record of `node`
    pub fn record(&self, node: NodeIndex) -> Option<&HeartbeatRecord> {
        self.records.get(node as usize)
    }

    /// True if `node` is watched
    pub fn is_known(&self, node: NodeIndex) -> bool {
        self.record(node).map_or(false, |r| r.known)
    }

    /// Misses of `node`
    pub fn missed(&self, node: NodeIndex) -> u8 {
        self.record(node).map_or(0, |r| r.missed)
    }

    /// Number of watched nodes
    pub fn known_count(&self) -> usize {
        self.records.iter().filter(|r| r.known).count()
    }

    /// Watched node indices
    pub fn known(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.known)
            .map(|(i, _)| i as NodeIndex)
    }
}
