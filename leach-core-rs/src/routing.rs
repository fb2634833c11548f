//! Routing Table Manager
//!
//! Fixed-capacity tables with one entry per destination. Each node owns a
//! volatile *local* table filled during discovery and a *permanent* table
//! installed from the election result.

use core::fmt;

use heapless::Vec;

use crate::config::DEFAULT_METRIC_HYSTERESIS;
use crate::types::*;

/// Selects one of a node's two tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Built during discovery
    Local,
    /// Installed from the last election
    Permanent,
}

/// One route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    /// Destination address
    pub dest: NodeAddress,
    /// Neighbour to hand the frame to
    pub next_hop: NodeAddress,
    /// Hops to the destination
    pub hop_count: u8,
    /// Link metric (RSSI) of the last update
    pub metric: Metric,
    /// Discovery sequence of the last update
    pub sequence: Sequence,
}

impl RoutingEntry {
    /// Create an entry
    pub const fn new(
        dest: NodeAddress,
        next_hop: NodeAddress,
        hop_count: u8,
        metric: Metric,
        sequence: Sequence,
    ) -> Self {
        Self {
            dest,
            next_hop,
            hop_count,
            metric,
            sequence,
        }
    }

    /// Entry a node keeps for itself
    pub const fn own(addr: NodeAddress) -> Self {
        Self::new(addr, addr, 0, 0, 0)
    }
}

/// What [`RoutingTable::patch_update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Destination was new
    Inserted,
    /// Newer sequence and the metric moved past the hysteresis
    MetricUpdated,
    /// Newer sequence, metric within the hysteresis
    Refreshed,
    /// Old sequence, or the node's own entry
    Unchanged,
}

/// Bounded routing table, unique per destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    owner: NodeAddress,
    hysteresis: Metric,
    entries: Vec<RoutingEntry, MAX_NODES>,
}

impl RoutingTable {
    /// Table holding only the owner's own entry
    pub fn new(owner: NodeAddress) -> Self {
        let mut table = Self::empty(owner);
        table.reset();
        table
    }

    /// Table with no entries at all
    pub fn empty(owner: NodeAddress) -> Self {
        Self {
            owner,
            hysteresis: DEFAULT_METRIC_HYSTERESIS,
            entries: Vec::new(),
        }
    }

    /// Set the metric hysteresis
    pub fn with_hysteresis(mut self, hysteresis: Metric) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    /// Back to the single self entry
    pub fn reset(&mut self) {
        self.entries.clear();
        // capacity is at least one
        let _ = self.entries.push(RoutingEntry::own(self.owner));
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append a route for an unseen destination
    ///
    /// Returns false when the destination is already present.
    pub fn insert(&mut self, entry: RoutingEntry) -> Result<bool> {
        if self.contains(&entry.dest) {
            return Ok(false);
        }
        self.entries.push(entry).map_err(|_| Error::TableFull)?;
        Ok(true)
    }

    /// Insert, or refresh an existing route with hysteresis
    ///
    /// An existing entry only changes when the incoming sequence is newer.
    /// Its metric is overwritten when it moved by at least the hysteresis;
    /// the sequence always follows. The owner's own entry never changes.
    pub fn patch_update(&mut self, entry: RoutingEntry) -> Result<PatchOutcome> {
        let hysteresis = self.hysteresis;
        let owner = self.owner;
        let Some(pos) = self.entries.iter().position(|e| e.dest == entry.dest) else {
            self.entries.push(entry).map_err(|_| Error::TableFull)?;
            return Ok(PatchOutcome::Inserted);
        };
        let existing = &mut self.entries[pos];
        if existing.dest == owner || entry.sequence <= existing.sequence {
            return Ok(PatchOutcome::Unchanged);
        }
        existing.sequence = entry.sequence;
        let delta = (i32::from(entry.metric) - i32::from(existing.metric)).abs();
        if delta >= i32::from(hysteresis) {
            existing.metric = entry.metric;
            Ok(PatchOutcome::MetricUpdated)
        } else {
            Ok(PatchOutcome::Refreshed)
        }
    }

    /// Next hop toward `dest`, first match
    pub fn next_hop(&self, dest: &NodeAddress) -> Option<NodeAddress> {
        self.get(dest).map(|e| e.next_hop)
    }

    /// Entry for `dest`
    pub fn get(&self, dest: &NodeAddress) -> Option<&RoutingEntry> {
        self.entries.iter().find(|e| e.dest == *dest)
    }

    /// True if `dest` has an entry
    pub fn contains(&self, dest: &NodeAddress) -> bool {
        self.get(dest).is_some()
    }

    /// All entries in insertion order
    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    /// Table owner
    pub fn owner(&self) -> NodeAddress {
        self.owner
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when only the owner's own entry remains
    pub fn is_self_only(&self) -> bool {
        self.entries.len() == 1 && self.entries[0] == RoutingEntry::own(self.owner)
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "routing table of {} ({} entries)", self.owner, self.entries.len())?;
        for e in self.entries.iter() {
            writeln!(
                f,
                "  dest {} next {} hops {} metric {} seq {}",
                e.dest, e.next_hop, e.hop_count, e.metric, e.sequence
            )?;
        }
        Ok(())
    }
}
