//! Master-side topology: address index table and link-quality matrix

use core::fmt;

use heapless::Vec;

use crate::matrix::HopMatrix;
use crate::types::*;

// ============================================================================
// Sentinels
// ============================================================================

/// Cell value for "no link"; 0 is a valid metric
pub const NO_LINK: Metric = i16::MIN;

/// Diagonal cell value
pub const SELF_LINK: Metric = i16::MAX;

// ============================================================================
// Node Index Table
// ============================================================================

/// Maps node addresses to compact matrix indices
///
/// Index 0 is the master. Indices are handed out in discovery order and
/// stay fixed for the lifetime of the table.
#[derive(Debug, Clone)]
pub struct NodeIndexTable {
    addresses: Vec<NodeAddress, MAX_NODES>,
}

impl NodeIndexTable {
    /// Create a table holding only the master
    pub fn new(master: NodeAddress) -> Self {
        let mut addresses = Vec::new();
        // capacity is at least one
        let _ = addresses.push(master);
        Self { addresses }
    }

    /// Index of a known address
    pub fn index_of(&self, addr: &NodeAddress) -> Option<NodeIndex> {
        self.addresses
            .iter()
            .position(|a| a == addr)
            .map(|i| i as NodeIndex)
    }

    /// Index of `addr`, assigning the next free one if unseen
    ///
    /// Returns the index and whether it was newly assigned.
    pub fn get_or_assign(&mut self, addr: NodeAddress) -> Result<(NodeIndex, bool)> {
        if let Some(idx) = self.index_of(&addr) {
            return Ok((idx, false));
        }
        self.addresses.push(addr).map_err(|_| Error::IndexExhausted)?;
        Ok(((self.addresses.len() - 1) as NodeIndex, true))
    }

    /// Address stored at `idx`
    pub fn address(&self, idx: NodeIndex) -> Option<NodeAddress> {
        self.addresses.get(idx as usize).copied()
    }

    /// Master address
    pub fn master(&self) -> NodeAddress {
        self.addresses[MASTER_INDEX as usize]
    }

    /// Number of assigned indices, master included
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when only the master is present
    pub fn is_empty(&self) -> bool {
        self.addresses.len() <= 1
    }

    /// Iterate `(index, address)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, NodeAddress)> + '_ {
        self.addresses
            .iter()
            .enumerate()
            .map(|(i, a)| (i as NodeIndex, *a))
    }
}

// ============================================================================
// Adjacency Matrix
// ============================================================================

/// Symmetric link-quality matrix
///
/// Written only through [`AdjacencyMatrix::set_link`], which mirrors every
/// write, so `(i, j)` and `(j, i)` always agree.
#[derive(Clone, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    cells: [[Metric; MAX_NODES]; MAX_NODES],
}

impl Default for AdjacencyMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl AdjacencyMatrix {
    /// Clean matrix: self sentinels on the diagonal, no links
    pub fn new() -> Self {
        let mut cells = [[NO_LINK; MAX_NODES]; MAX_NODES];
        for (i, row) in cells.iter_mut().enumerate() {
            row[i] = SELF_LINK;
        }
        Self { cells }
    }

    /// Return to the clean state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record a link in both directions
    ///
    /// Returns true if the stored metric changed. Writes to the diagonal
    /// are ignored.
    pub fn set_link(&mut self, a: NodeIndex, b: NodeIndex, metric: Metric) -> Result<bool> {
        let (a, b) = (a as usize, b as usize);
        if a >= MAX_NODES || b >= MAX_NODES {
            return Err(Error::InvalidArg);
        }
        if a == b {
            return Ok(false);
        }
        // the sentinels are not metrics
        let metric = metric.clamp(NO_LINK + 1, SELF_LINK - 1);
        let changed = self.cells[a][b] != metric;
        self.cells[a][b] = metric;
        self.cells[b][a] = metric;
        Ok(changed)
    }

    /// Metric of the link between `a` and `b`
    pub fn link(&self, a: NodeIndex, b: NodeIndex) -> Option<Metric> {
        let (a, b) = (a as usize, b as usize);
        if a >= MAX_NODES || b >= MAX_NODES || a == b {
            return None;
        }
        match self.cells[a][b] {
            NO_LINK => None,
            m => Some(m),
        }
    }

    /// True if `a` and `b` are direct neighbours
    pub fn has_link(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.link(a, b).is_some()
    }

    /// Raw cell, sentinels included
    pub fn cell(&self, a: NodeIndex, b: NodeIndex) -> Metric {
        self.cells[a as usize % MAX_NODES][b as usize % MAX_NODES]
    }

    /// Number of direct neighbours of `a`
    pub fn degree(&self, a: NodeIndex) -> usize {
        (0..MAX_NODES as NodeIndex).filter(|&b| self.has_link(a, b)).count()
    }

    /// True when no off-diagonal cell holds a link
    pub fn is_clean(&self) -> bool {
        *self == Self::new()
    }

    /// Mirror property over every cell
    pub fn is_symmetric(&self) -> bool {
        (0..MAX_NODES).all(|i| (0..MAX_NODES).all(|j| self.cells[i][j] == self.cells[j][i]))
    }

    /// Binary 1-hop template restricted to `nodes`, in the given order
    pub fn template(&self, nodes: &[NodeIndex]) -> Result<HopMatrix> {
        let mut m = HopMatrix::zeros(nodes.len())?;
        for (i, &a) in nodes.iter().enumerate() {
            for (j, &b) in nodes.iter().enumerate() {
                if self.has_link(a, b) {
                    m.set(i, j, 1)?;
                }
            }
        }
        Ok(m)
    }

    /// Which of `nodes` reach the master directly
    pub fn master_links(&self, nodes: &[NodeIndex]) -> Vec<bool, MAX_NODES> {
        nodes
            .iter()
            .map(|&n| self.has_link(MASTER_INDEX, n))
            .collect()
    }
}

impl fmt::Debug for AdjacencyMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdjacencyMatrix\n{self}")
    }
}

impl fmt::Display for AdjacencyMatrix {
    /// One row per line; `-` for no link, `*` on the diagonal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.iter() {
            for (j, cell) in row.iter().enumerate() {
                if j > 0 {
                    f.write_str(" ")?;
                }
                match *cell {
                    NO_LINK => write!(f, "{:>4}", "-")?,
                    SELF_LINK => write!(f, "{:>4}", "*")?,
                    m => write!(f, "{m:>4}")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
