//! Cluster-Head Selection
//!
//! Nodes are ranked by battery-weighted multi-hop connectivity, then the
//! combinations of ranked positions are searched for the head set with the
//! best "grade": heads that reach the master directly plus links between
//! the heads themselves. For three heads the grade tops out at 6.
//!
//! All functions work on candidate positions `0..dim` of the template.
//! Mapping positions back to network indices is the caller's business.

use heapless::Vec;

use crate::matrix::{k_hop_reachability, HopMatrix};
use crate::types::*;

// ============================================================================
// Configuration
// ============================================================================

/// Upper bound on head-set combinations: C(MAX_NODES, 3)
pub const MAX_COMBINATIONS: usize = 120;

const _: () = assert!(
    MAX_COMBINATIONS >= MAX_NODES * (MAX_NODES - 1) * (MAX_NODES - 2) / 6
);

/// Best grade reachable by `head_count` heads
pub const fn max_grade(head_count: usize) -> u8 {
    (head_count + head_count * head_count.saturating_sub(1) / 2) as u8
}

// ============================================================================
// Results
// ============================================================================

/// Output of the head search, in candidate positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadSelection {
    /// Candidate positions, best first
    pub ranking: Vec<usize, MAX_NODES>,
    /// Chosen heads, in ranking order
    pub heads: Vec<usize, HEAD_COUNT>,
    /// Master links plus inter-head links of the chosen set
    pub grade: u8,
}

/// Role of one node after an election, in network indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Node index
    pub node: NodeIndex,
    /// Head the node reports to; a head names itself
    pub head: NodeIndex,
    /// Next hop toward the master
    pub uplink: NodeIndex,
    /// Hops from the master along the route tree
    pub hop_count: u8,
}

/// Heads and per-node assignments of one election cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElectionResult {
    /// Advertisement sequence of this cycle
    pub epoch: u8,
    /// Elected heads
    pub heads: Vec<NodeIndex, HEAD_COUNT>,
    /// Grade of the head set
    pub grade: u8,
    /// One entry per reachable node, ordered by hop count
    pub assignments: Vec<Assignment, MAX_NODES>,
}

impl ElectionResult {
    /// True if `node` was elected
    pub fn is_head(&self, node: NodeIndex) -> bool {
        self.heads.contains(&node)
    }

    /// Assignment of `node`
    pub fn assignment(&self, node: NodeIndex) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.node == node)
    }

    /// Head that `node` belongs to
    pub fn head_of(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.assignment(node).map(|a| a.head)
    }

    /// Nodes between the master and `node` along the uplinks, master side first
    ///
    /// `None` if `node` is unassigned or an uplink chain does not end at
    /// the master.
    pub fn relays(&self, node: NodeIndex) -> Option<Vec<NodeIndex, MAX_ROUTE_LEN>> {
        let mut chain: Vec<NodeIndex, MAX_ROUTE_LEN> = Vec::new();
        let mut current = self.assignment(node)?.uplink;
        while current != MASTER_INDEX {
            if chain.contains(&current) || current == node {
                return None;
            }
            chain.push(current).ok()?;
            current = self.assignment(current)?.uplink;
        }
        chain.reverse();
        Some(chain)
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Weighted 1/2/3-hop walk counts for every ordered pair
pub fn connectivity_scores(template: &HopMatrix, weights: [u32; 3]) -> Result<HopMatrix> {
    let dim = template.dim();
    let mut scores = HopMatrix::zeros(dim)?;
    for (k, weight) in (1u8..=3).zip(weights) {
        let Some(reach) = k_hop_reachability(template, k) else {
            continue;
        };
        for i in 0..dim {
            for j in 0..dim {
                let v = scores.get(i, j).saturating_add(weight.saturating_mul(reach.get(i, j)));
                scores.set(i, j, v)?;
            }
        }
    }
    Ok(scores)
}

/// Rank positions by `sum_{j != i} score(i, j) * battery[i]`, descending
///
/// Ties keep the lower position first.
pub fn rank_nodes(scores: &HopMatrix, battery: &[Fixed]) -> Vec<usize, MAX_NODES> {
    let dim = scores.dim().min(battery.len());
    let mut keyed: Vec<(usize, u64), MAX_NODES> = Vec::new();
    for i in 0..dim {
        let connectivity: u64 = (0..dim)
            .filter(|&j| j != i)
            .map(|j| scores.get(i, j) as u64)
            .sum();
        let energy = battery[i].to_bits().max(0) as u64;
        // dim <= MAX_NODES
        let _ = keyed.push((i, connectivity.saturating_mul(energy)));
    }
    keyed.sort_by(|a, b| b.1.cmp(&a.1));
    keyed.iter().map(|(i, _)| *i).collect()
}

/// Master links plus pairwise links among `heads`
pub fn head_grade(template: &HopMatrix, master_links: &[bool], heads: &[usize]) -> u8 {
    let to_master = heads
        .iter()
        .filter(|&&h| master_links.get(h).copied().unwrap_or(false))
        .count();
    let mut between = 0usize;
    for (n, &a) in heads.iter().enumerate() {
        for &b in &heads[n + 1..] {
            if template.get(a, b) > 0 {
                between += 1;
            }
        }
    }
    (to_master + between) as u8
}

/// Every `k`-subset of `0..n` in lexicographic order
pub fn combinations(n: usize, k: usize) -> Vec<[usize; HEAD_COUNT], MAX_COMBINATIONS> {
    let mut out = Vec::new();
    if k == 0 || k > HEAD_COUNT || k > n {
        return out;
    }
    let mut idx = [0usize; HEAD_COUNT];
    for (i, slot) in idx.iter_mut().enumerate().take(k) {
        *slot = i;
    }
    loop {
        if out.push(idx).is_err() {
            break;
        }
        // rightmost slot that can still advance
        let Some(pos) = (0..k).rev().find(|&p| idx[p] < n - k + p) else {
            break;
        };
        idx[pos] += 1;
        for p in pos + 1..k {
            idx[p] = idx[p - 1] + 1;
        }
    }
    out
}

// ============================================================================
// Selection
// ============================================================================

/// Choose `head_count` cluster heads
///
/// Fewer candidates than heads elects every candidate. No candidates at
/// all is [`Error::NoCandidates`].
pub fn choose_cluster_heads(
    template: &HopMatrix,
    master_links: &[bool],
    battery: &[Fixed],
    weights: [u32; 3],
    head_count: usize,
) -> Result<HeadSelection> {
    let dim = template.dim();
    if master_links.len() != dim || battery.len() != dim {
        return Err(Error::InvalidArg);
    }
    if head_count == 0 || head_count > HEAD_COUNT {
        return Err(Error::InvalidArg);
    }
    if dim == 0 {
        return Err(Error::NoCandidates);
    }

    let scores = connectivity_scores(template, weights)?;
    let ranking = rank_nodes(&scores, battery);

    if dim <= head_count {
        let heads: Vec<usize, HEAD_COUNT> = ranking.iter().copied().take(HEAD_COUNT).collect();
        let grade = head_grade(template, master_links, &heads);
        return Ok(HeadSelection { ranking, heads, grade });
    }

    let table = combinations(dim, head_count);
    for target in (1..=max_grade(head_count)).rev() {
        for combo in table.iter() {
            let heads = ranked_heads(&ranking, &combo[..head_count]);
            let grade = head_grade(template, master_links, &heads);
            if grade >= target {
                return Ok(HeadSelection { ranking, heads, grade });
            }
        }
    }

    // nothing scores above zero: take the top-ranked set
    let heads = ranked_heads(&ranking, &table[0][..head_count]);
    let grade = head_grade(template, master_links, &heads);
    Ok(HeadSelection { ranking, heads, grade })
}

fn ranked_heads(ranking: &[usize], positions: &[usize]) -> Vec<usize, HEAD_COUNT> {
    positions.iter().filter_map(|&p| ranking.get(p).copied()).collect()
}
