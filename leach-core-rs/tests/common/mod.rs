//! In-memory radio network shared by the integration suites
//!
//! Node `i` has address `i + 1`; node 0 is the master. Frames are delivered
//! in FIFO order over explicit symmetric RSSI links.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use leach_core::prelude::*;
use leach_core::{Outbound, RecordingRadio};

pub fn addr(id: u16) -> NodeAddress {
    NodeAddress::from_node_id(id)
}

pub fn config() -> NodeConfig {
    NodeConfig {
        stable_after_rounds: 2,
        ..NodeConfig::default()
    }
}

pub struct Network {
    pub nodes: Vec<Node>,
    pub radios: Vec<RecordingRadio>,
    pub links: HashMap<(usize, usize), Metric>,
    queue: VecDeque<(usize, Outbound)>,
}

impl Network {
    pub fn new(members: usize) -> Self {
        let mut nodes = vec![Node::master(addr(1), config())];
        for i in 1..=members {
            nodes.push(Node::member(addr(i as u16 + 1), config()));
        }
        let radios = nodes.iter().map(|_| RecordingRadio::new()).collect();
        Self {
            nodes,
            radios,
            links: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn link(&mut self, a: usize, b: usize, rssi: Metric) {
        self.links.insert((a, b), rssi);
        self.links.insert((b, a), rssi);
    }

    pub fn unlink_all(&mut self, node: usize) {
        self.links.retain(|&(a, b), _| a != node && b != node);
    }

    pub fn add_member(&mut self) -> usize {
        let id = self.nodes.len() as u16 + 1;
        self.nodes.push(Node::member(addr(id), config()));
        self.radios.push(RecordingRadio::new());
        self.nodes.len() - 1
    }

    fn collect(&mut self, i: usize) {
        for out in self.radios[i].take() {
            self.queue.push_back((i, out));
        }
    }

    /// Deliver frames until nothing is left in flight
    pub fn run(&mut self) {
        let mut steps = 0;
        while let Some((from, out)) = self.queue.pop_front() {
            steps += 1;
            assert!(steps < 10_000, "frame storm");
            let src = self.nodes[from].address();
            for to in 0..self.nodes.len() {
                let Some(&rssi) = self.links.get(&(from, to)) else {
                    continue;
                };
                let frame = match out.dest {
                    None => InboundFrame::broadcast(&out.payload, src, rssi),
                    Some(dest) if dest == self.nodes[to].address() => {
                        InboundFrame::unicast(&out.payload, src, dest, rssi)
                    }
                    Some(_) => continue,
                };
                let _ = self.nodes[to].handle_frame(&mut self.radios[to], &frame);
                self.collect(to);
            }
        }
    }

    pub fn master(&mut self) -> &mut Node {
        &mut self.nodes[0]
    }

    pub fn hello_tick(&mut self) {
        let _ = self.nodes[0].on_hello_timer(&mut self.radios[0]);
        self.collect(0);
        self.run();
    }

    pub fn election_tick(&mut self) {
        let _ = self.nodes[0].on_election_timer(&mut self.radios[0]);
        self.collect(0);
        self.run();
    }

    pub fn heartbeat_tick(&mut self, skip: &[usize]) {
        for i in 1..self.nodes.len() {
            if skip.contains(&i) {
                continue;
            }
            let _ = self.nodes[i].on_heartbeat_timer(&mut self.radios[i]);
            self.collect(i);
        }
        self.run();
    }

    /// HELLO rounds until the master declares the topology stable
    pub fn settle(&mut self) {
        for _ in 0..20 {
            self.hello_tick();
            if self.nodes[0].state() == DiscoveryState::Stable {
                return;
            }
        }
        panic!("network never settled");
    }

    pub fn index(&self, node: usize) -> NodeIndex {
        self.nodes[0]
            .index_table()
            .index_of(&self.nodes[node].address())
            .unwrap()
    }

    /// Position of the node owning `address`
    pub fn position(&self, address: &NodeAddress) -> Option<usize> {
        self.nodes.iter().position(|n| n.address() == *address)
    }

    /// Nodes visited following permanent uplinks from `node` to the master
    ///
    /// `None` when a hop is missing, crosses no physical link or loops.
    pub fn uplink_path(&self, node: usize) -> Option<Vec<usize>> {
        let master = self.nodes[0].address();
        let mut path = vec![node];
        let mut at = node;
        while at != 0 {
            if path.len() > MAX_NODES {
                return None;
            }
            let next = self.nodes[at].next_hop(&master, TableKind::Permanent)?;
            let next = self.position(&next)?;
            if !self.links.contains_key(&(at, next)) {
                return None;
            }
            path.push(next);
            at = next;
        }
        Some(path)
    }
}

/// Master plus a chain `0 - 1 - 2 - ... - n`
pub fn chain(members: usize) -> Network {
    let mut net = Network::new(members);
    for i in 0..members {
        net.link(i, i + 1, -50);
    }
    net
}
