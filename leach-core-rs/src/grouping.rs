//! Node-Group Assignment and route-tree derivation
//!
//! Works on the same candidate positions as [`crate::election`]; the
//! master is implicit and reached through the `master_links` vector.

use heapless::Vec;

use crate::matrix::HopMatrix;
use crate::types::*;

/// Uplink of a node in the route tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplink {
    /// Directly to the master
    Master,
    /// Through another candidate position
    Node(usize),
}

// ============================================================================
// Hop Distances
// ============================================================================

/// Hops from `source` to every position over the template, by BFS
pub fn hop_distances(template: &HopMatrix, source: usize) -> [Option<u8>; MAX_NODES] {
    let mut dist = [None; MAX_NODES];
    if source >= template.dim() {
        return dist;
    }
    dist[source] = Some(0);
    bfs(template, &mut dist);
    dist
}

/// Hops from the master to every position
pub fn master_distances(template: &HopMatrix, master_links: &[bool]) -> [Option<u8>; MAX_NODES] {
    let mut dist = [None; MAX_NODES];
    for (i, linked) in master_links.iter().enumerate().take(template.dim()) {
        if *linked {
            dist[i] = Some(1);
        }
    }
    bfs(template, &mut dist);
    dist
}

/// Hops from `source` to every position when the master may be crossed
///
/// The master counts as an extra node linked to every `master_links`
/// position, so a member whose only neighbour is the master still reaches
/// heads on the far side.
pub fn hop_distances_via_master(
    template: &HopMatrix,
    master_links: &[bool],
    source: usize,
) -> [Option<u8>; MAX_NODES] {
    let mut dist = hop_distances(template, source);
    let dim = template.dim().min(master_links.len());
    let to_master = (0..dim)
        .filter(|&i| master_links[i])
        .filter_map(|i| dist[i])
        .min()
        .map(|d| d.saturating_add(1));
    let Some(to_master) = to_master else {
        return dist;
    };
    let from_master = master_distances(template, master_links);
    for (slot, fm) in dist.iter_mut().zip(from_master).take(dim) {
        if let Some(fm) = fm {
            let via = to_master.saturating_add(fm);
            *slot = Some(slot.map_or(via, |d| d.min(via)));
        }
    }
    dist
}

fn bfs(template: &HopMatrix, dist: &mut [Option<u8>; MAX_NODES]) {
    let dim = template.dim();
    let mut level = dist.iter().filter_map(|d| *d).min().unwrap_or(0);
    loop {
        let mut grew = false;
        for i in 0..dim {
            if dist[i] != Some(level) {
                continue;
            }
            for j in 0..dim {
                if template.get(i, j) > 0 && dist[j].is_none() {
                    dist[j] = Some(level + 1);
                    grew = true;
                }
            }
        }
        if !grew {
            break;
        }
        level += 1;
    }
}

/// Master-to-head hop counts from walk counts of the augmented matrix
///
/// Position 0 of the augmented matrix is the master, candidate `i` sits at
/// `i + 1`. A head's distance is the first `k` at which a `k`-walk from
/// the master reaches it; unreachable heads get `None`.
pub fn head_master_distances(
    template: &HopMatrix,
    master_links: &[bool],
    heads: &[usize],
) -> Result<Vec<Option<u8>, HEAD_COUNT>> {
    let dim = template.dim();
    if master_links.len() != dim || heads.iter().any(|&h| h >= dim) {
        return Err(Error::InvalidArg);
    }
    let mut augmented = HopMatrix::zeros(dim + 1)?;
    for i in 0..dim {
        if master_links[i] {
            augmented.set(0, i + 1, 1)?;
            augmented.set(i + 1, 0, 1)?;
        }
        for j in 0..dim {
            augmented.set(i + 1, j + 1, template.get(i, j))?;
        }
    }

    let mut distances: Vec<Option<u8>, HEAD_COUNT> = heads.iter().map(|_| None).collect();
    let mut walks = augmented;
    for k in 1..=dim as u8 {
        for (slot, &h) in distances.iter_mut().zip(heads) {
            if slot.is_none() && walks.get(0, h + 1) > 0 {
                *slot = Some(k);
            }
        }
        if distances.iter().all(Option::is_some) {
            break;
        }
        walks = walks.multiply(&augmented)?;
    }
    Ok(distances)
}

// ============================================================================
// Group Assignment
// ============================================================================

/// Head membership of every candidate position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    /// Elected heads, positions
    pub heads: Vec<usize, HEAD_COUNT>,
    /// Head of each position; heads map to themselves, `None` if unreachable
    pub head_of: Vec<Option<usize>, MAX_NODES>,
    /// Members assigned to each head, same order as `heads`
    pub load: Vec<u8, HEAD_COUNT>,
    /// Master-to-head hops, same order as `heads`
    pub head_distance: Vec<Option<u8>, HEAD_COUNT>,
}

impl Grouping {
    /// True if `pos` is a head
    pub fn is_head(&self, pos: usize) -> bool {
        self.heads.contains(&pos)
    }

    /// Head of `pos`
    pub fn head_of(&self, pos: usize) -> Option<usize> {
        self.head_of.get(pos).copied().flatten()
    }

    /// Head x position membership bitmap
    pub fn membership(&self) -> Vec<[bool; MAX_NODES], HEAD_COUNT> {
        self.heads
            .iter()
            .map(|&h| {
                let mut row = [false; MAX_NODES];
                for (pos, head) in self.head_of.iter().enumerate() {
                    row[pos] = *head == Some(h) && pos != h;
                }
                row
            })
            .collect()
    }
}

/// Assign every non-head position to exactly one head
///
/// Positions with exactly `k` direct head links go before those with
/// `k + 1`. Among linked heads the choice maximises
/// `battery[head] / (1 + load[head]) / distance(head, master)`, with the
/// load updated after each pick. Positions with no direct head link join
/// the head with the fewest hops, crossing the master if that is the only
/// way, so every position reachable from the master gets a head.
pub fn assign_groups(
    template: &HopMatrix,
    master_links: &[bool],
    battery: &[Fixed],
    heads: &[usize],
) -> Result<Grouping> {
    let dim = template.dim();
    if battery.len() != dim || heads.is_empty() || heads.len() > HEAD_COUNT {
        return Err(Error::InvalidArg);
    }
    let head_distance = head_master_distances(template, master_links, heads)?;

    let mut head_of: Vec<Option<usize>, MAX_NODES> = (0..dim).map(|_| None).collect();
    let mut load: Vec<u8, HEAD_COUNT> = heads.iter().map(|_| 0).collect();
    for &h in heads {
        head_of[h] = Some(h);
    }

    let value = |slot: usize, load: &[u8]| -> Fixed {
        let cost = head_distance[slot].unwrap_or(dim as u8 + 1).max(1) as i32;
        let divisor = (1 + load[slot] as i32) * cost;
        battery[heads[slot]] / Fixed::saturating_from_num(divisor)
    };

    let head_links = |i: usize| heads.iter().filter(|&&h| template.get(i, h) > 0).count();

    for k in 1..=heads.len() {
        for i in 0..dim {
            if head_of[i].is_some() || head_links(i) != k {
                continue;
            }
            let mut best: Option<(usize, Fixed)> = None;
            for (slot, &h) in heads.iter().enumerate() {
                if template.get(i, h) == 0 {
                    continue;
                }
                let v = value(slot, load.as_slice());
                if best.map_or(true, |(_, b)| v > b) {
                    best = Some((slot, v));
                }
            }
            if let Some((slot, _)) = best {
                head_of[i] = Some(heads[slot]);
                load[slot] = load[slot].saturating_add(1);
            }
        }
    }

    // no direct head link: nearest head, value breaks ties
    let from_head: Vec<[Option<u8>; MAX_NODES], HEAD_COUNT> = heads
        .iter()
        .map(|&h| hop_distances_via_master(template, master_links, h))
        .collect();
    for i in 0..dim {
        if head_of[i].is_some() {
            continue;
        }
        let mut best: Option<(usize, u8, Fixed)> = None;
        for slot in 0..heads.len() {
            let Some(d) = from_head[slot][i] else {
                continue;
            };
            let v = value(slot, load.as_slice());
            let better = match best {
                None => true,
                Some((_, bd, bv)) => d < bd || (d == bd && v > bv),
            };
            if better {
                best = Some((slot, d, v));
            }
        }
        if let Some((slot, _, _)) = best {
            head_of[i] = Some(heads[slot]);
            load[slot] = load[slot].saturating_add(1);
        }
    }

    Ok(Grouping {
        heads: heads.iter().copied().collect(),
        head_of,
        load,
        head_distance,
    })
}

// ============================================================================
// Route Tree
// ============================================================================

/// Uplink tree toward the master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTree {
    parent: Vec<Option<Uplink>, MAX_NODES>,
    hops: Vec<Option<u8>, MAX_NODES>,
}

impl RouteTree {
    /// Uplink of `pos`, `None` when unreachable
    pub fn parent(&self, pos: usize) -> Option<Uplink> {
        self.parent.get(pos).copied().flatten()
    }

    /// Hops from the master to `pos` along the tree
    pub fn hop_count(&self, pos: usize) -> Option<u8> {
        self.hops.get(pos).copied().flatten()
    }

    /// Ancestor of `pos` adjacent to the master
    pub fn first_hop(&self, pos: usize) -> Option<usize> {
        let mut current = pos;
        for _ in 0..=self.parent.len() {
            match self.parent(current)? {
                Uplink::Master => return Some(current),
                Uplink::Node(next) => current = next,
            }
        }
        None
    }

    /// Number of positions covered
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// True when the tree covers no positions
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// Derive a loop-free uplink for every reachable position
///
/// A parent must rank strictly closer to the master, where rank is
/// `2 * depth`, plus one for non-heads. Among eligible parents a member
/// takes its own head first, then its `preferred` uplink (the one it used
/// during discovery), then the master; a head takes the master first.
/// Remaining ties go to the lowest rank, then the lowest position.
pub fn build_route_tree(
    template: &HopMatrix,
    master_links: &[bool],
    grouping: &Grouping,
    preferred: &[Option<Uplink>],
) -> Result<RouteTree> {
    let dim = template.dim();
    if master_links.len() != dim || grouping.head_of.len() != dim {
        return Err(Error::InvalidArg);
    }
    let depth = master_distances(template, master_links);
    let rank = |pos: usize| -> Option<u16> {
        depth[pos].map(|d| 2 * d as u16 + u16::from(!grouping.is_head(pos)))
    };

    let mut parent: Vec<Option<Uplink>, MAX_NODES> = Vec::new();
    for i in 0..dim {
        let Some(own) = rank(i) else {
            let _ = parent.push(None);
            continue;
        };
        let eligible = |u: Uplink| match u {
            Uplink::Master => master_links[i],
            Uplink::Node(j) => {
                j < dim && j != i && template.get(i, j) > 0 && rank(j).map_or(false, |r| r < own)
            }
        };

        let mut choices: Vec<Uplink, 3> = Vec::new();
        if grouping.is_head(i) {
            let _ = choices.push(Uplink::Master);
        } else if let Some(h) = grouping.head_of(i) {
            let _ = choices.push(Uplink::Node(h));
        }
        if let Some(p) = preferred.get(i).copied().flatten() {
            let _ = choices.push(p);
        }
        let _ = choices.push(Uplink::Master);

        let chosen = choices.iter().copied().find(|&u| eligible(u)).or_else(|| {
            (0..dim)
                .filter(|&j| eligible(Uplink::Node(j)))
                .min_by_key(|&j| (rank(j), j))
                .map(Uplink::Node)
        });
        let _ = parent.push(chosen);
    }

    let mut tree = RouteTree {
        parent,
        hops: Vec::new(),
    };
    for i in 0..dim {
        let mut count = 0u8;
        let mut current = Some(i);
        let mut hops = None;
        while let Some(pos) = current {
            count += 1;
            match tree.parent(pos) {
                Some(Uplink::Master) => {
                    hops = Some(count);
                    current = None;
                }
                Some(Uplink::Node(next)) if (count as usize) <= dim => current = Some(next),
                _ => current = None,
            }
        }
        let _ = tree.hops.push(hops);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(dim: usize, edges: &[(usize, usize)]) -> HopMatrix {
        let mut m = HopMatrix::zeros(dim).unwrap();
        for &(a, b) in edges {
            m.set(a, b, 1).unwrap();
            m.set(b, a, 1).unwrap();
        }
        m
    }

    fn ones(n: usize) -> std::vec::Vec<Fixed> {
        vec![Fixed::ONE; n]
    }

    #[test]
    fn test_hop_distances_chain() {
        let t = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        let d = hop_distances(&t, 0);
        assert_eq!(&d[..4], &[Some(0), Some(1), Some(2), Some(3)]);

        let m = master_distances(&t, &[true, false, false, false]);
        assert_eq!(&m[..4], &[Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_head_master_distances() {
        let t = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        let d = head_master_distances(&t, &[true, false, false, false], &[0, 2, 3]).unwrap();
        assert_eq!(d.as_slice(), &[Some(1), Some(3), Some(4)]);

        let t = graph(3, &[(0, 1)]);
        let d = head_master_distances(&t, &[true, false, false], &[2]).unwrap();
        assert_eq!(d.as_slice(), &[None]);
    }

    #[test]
    fn test_single_link_nodes_go_first() {
        // heads 0 and 1; node 2 sees only head 0, node 3 sees both
        let t = graph(4, &[(0, 2), (0, 3), (1, 3)]);
        let g = assign_groups(&t, &[true, true, false, false], &ones(4), &[0, 1]).unwrap();
        assert_eq!(g.head_of(2), Some(0));
        // head 0 already carries node 2, so node 3 balances onto head 1
        assert_eq!(g.head_of(3), Some(1));
        assert_eq!(g.load.as_slice(), &[1, 1]);
    }

    #[test]
    fn test_battery_and_distance_steer_choice() {
        // node 2 sees both heads; head 0 is two hops from the master
        let t = graph(4, &[(0, 2), (1, 2), (0, 3)]);
        let links = [false, true, false, true];
        let g = assign_groups(&t, &links, &ones(4), &[0, 1]).unwrap();
        assert_eq!(g.head_of(2), Some(1));

        let battery = [Fixed::ONE, Fixed::from_num(0.2), Fixed::ONE, Fixed::ONE];
        let g = assign_groups(&t, &links, &battery, &[0, 1]).unwrap();
        assert_eq!(g.head_of(2), Some(0));
    }

    #[test]
    fn test_far_nodes_join_nearest_head() {
        // 0 - 1 - 2 - 3 - 4, heads 0 and 4
        let t = graph(5, &[(0, 1), (1, 2), (2, 3), (3, 4)]);
        let g = assign_groups(&t, &[true, false, false, false, false], &ones(5), &[0, 4]).unwrap();
        assert_eq!(g.head_of(1), Some(0));
        assert_eq!(g.head_of(3), Some(4));
        // two hops from either head
        assert!(g.head_of(2).is_some());
        let membership = g.membership();
        assert!(membership[0][1]);
        assert!(!membership[0][0]);
    }

    #[test]
    fn test_hop_distances_via_master() {
        // 0 - 1 - 3, and 2 hangs off the master alone
        let t = graph(4, &[(0, 1), (1, 3)]);
        let links = [true, false, true, false];
        let d = hop_distances_via_master(&t, &links, 2);
        assert_eq!(&d[..4], &[Some(2), Some(3), Some(0), Some(4)]);
        // a direct path beats the detour
        let d = hop_distances_via_master(&t, &links, 3);
        assert_eq!(&d[..2], &[Some(2), Some(1)]);
    }

    #[test]
    fn test_master_only_leaf_joins_a_head() {
        let t = graph(4, &[(0, 1), (1, 3)]);
        let links = [true, false, true, false];
        let g = assign_groups(&t, &links, &ones(4), &[0, 1, 3]).unwrap();
        assert_eq!(g.head_of(2), Some(0));

        let tree = build_route_tree(&t, &links, &g, &[None; 4]).unwrap();
        assert_eq!(tree.parent(2), Some(Uplink::Master));
        assert_eq!(tree.hop_count(2), Some(1));
    }

    #[test]
    fn test_unreachable_node_stays_unassigned() {
        let t = graph(3, &[(0, 1)]);
        let g = assign_groups(&t, &[true, true, false], &ones(3), &[0]).unwrap();
        assert_eq!(g.head_of(1), Some(0));
        assert_eq!(g.head_of(2), None);
    }

    #[test]
    fn test_route_tree_chain() {
        let t = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        let links = [true, false, false, false];
        let g = assign_groups(&t, &links, &ones(4), &[0, 1, 2]).unwrap();
        let tree = build_route_tree(&t, &links, &g, &[None; 4]).unwrap();
        assert_eq!(tree.parent(0), Some(Uplink::Master));
        assert_eq!(tree.parent(1), Some(Uplink::Node(0)));
        assert_eq!(tree.parent(3), Some(Uplink::Node(2)));
        assert_eq!(tree.hop_count(3), Some(4));
        assert_eq!(tree.first_hop(3), Some(0));
    }

    #[test]
    fn test_route_tree_member_via_head_at_same_depth() {
        // 0 and 1 reach the master and each other; 1 is the head
        let t = graph(2, &[(0, 1)]);
        let links = [true, true];
        let g = assign_groups(&t, &links, &ones(2), &[1]).unwrap();
        let tree = build_route_tree(&t, &links, &g, &[None; 2]).unwrap();
        assert_eq!(tree.parent(0), Some(Uplink::Node(1)));
        assert_eq!(tree.hop_count(0), Some(2));
        assert_eq!(tree.parent(1), Some(Uplink::Master));
    }

    #[test]
    fn test_route_tree_never_points_to_own_member() {
        // head 2 is only reachable through node 1
        let t = graph(3, &[(0, 1), (1, 2)]);
        let links = [true, false, false];
        let g = assign_groups(&t, &links, &ones(3), &[0, 2]).unwrap();
        let tree = build_route_tree(&t, &links, &g, &[None; 3]).unwrap();
        for pos in 0..3 {
            assert!(tree.hop_count(pos).is_some(), "no route for {pos}");
        }
        assert_eq!(tree.first_hop(2), Some(0));
    }

    #[test]
    fn test_route_tree_uses_preferred_uplink() {
        // node 2 can go through 0 or 1, both one hop from the master
        let t = graph(3, &[(0, 2), (1, 2)]);
        let links = [true, true, false];
        let g = assign_groups(&t, &links, &ones(3), &[2]).unwrap();
        let tree = build_route_tree(&t, &links, &g, &[None, None, Some(Uplink::Node(1))]).unwrap();
        assert_eq!(tree.parent(2), Some(Uplink::Node(1)));

        let tree = build_route_tree(&t, &links, &g, &[None; 3]).unwrap();
        assert_eq!(tree.parent(2), Some(Uplink::Node(0)));
    }
}
