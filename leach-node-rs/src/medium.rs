//! In-memory radio medium
//!
//! Frames travel only over configured links and arrive with the link's
//! RSSI. Powered-off nodes neither send nor receive.

use std::collections::{HashMap, HashSet};

use leach_core::{Metric, NodeAddress, Outbound};

use crate::topology::LinkSpec;

/// Link table plus the set of powered nodes
#[derive(Debug, Default)]
pub struct Medium {
    links: HashMap<(NodeAddress, NodeAddress), Metric>,
    online: HashSet<NodeAddress>,
}

impl Medium {
    /// Build from symmetric link specs
    pub fn new(links: &[LinkSpec]) -> Self {
        let mut medium = Self::default();
        for link in links {
            medium.links.insert((link.a, link.b), link.rssi);
            medium.links.insert((link.b, link.a), link.rssi);
        }
        medium
    }

    /// Power a node on or off
    pub fn set_online(&mut self, addr: NodeAddress, online: bool) {
        if online {
            self.online.insert(addr);
        } else {
            self.online.remove(&addr);
        }
    }

    /// True if `addr` is powered
    pub fn is_online(&self, addr: &NodeAddress) -> bool {
        self.online.contains(addr)
    }

    /// RSSI of the link from `a` to `b`
    pub fn rssi(&self, a: &NodeAddress, b: &NodeAddress) -> Option<Metric> {
        self.links.get(&(*a, *b)).copied()
    }

    /// Receivers of `frame` sent by `from`, with the RSSI each one measures
    pub fn receivers(&self, from: &NodeAddress, frame: &Outbound) -> Vec<(NodeAddress, Metric)> {
        if !self.is_online(from) {
            return Vec::new();
        }
        let mut out: Vec<(NodeAddress, Metric)> = self
            .links
            .iter()
            .filter(|((src, dst), _)| src == from && self.is_online(dst))
            .filter(|((_, dst), _)| frame.dest.map_or(true, |d| d == *dst))
            .map(|((_, dst), rssi)| (*dst, *rssi))
            .collect();
        // deterministic delivery order
        out.sort_by_key(|(addr, _)| *addr);
        out
    }
}
