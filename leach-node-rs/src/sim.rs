//! Simulated network
//!
//! Every node runs the real protocol state machine; only the radio and the
//! sensors are simulated. Timer ticks come from tokio intervals scaled by a
//! speed factor, frames are delivered synchronously after each tick until
//! the medium is quiet.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use leach_core::{
    DiscoveryState, Error, InboundFrame, Node, NodeAddress, Outbound, RecordingRadio, Role,
    StatusEvent,
};
use serde::Serialize;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::medium::Medium;
use crate::sensors::SimSensors;
use crate::topology::Topology;

/// Frames delivered per pump before the medium is declared stormy
const MAX_DELIVERIES_PER_PUMP: usize = 100_000;

/// Periodic node activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Master HELLO flood
    Hello,
    /// Master election and advertisement
    Election,
    /// Master liveness check
    Liveness,
    /// Member heartbeat
    Heartbeat,
    /// Sensor sampling on every node
    Sensor,
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Frames handed to a radio
    pub sent: u64,
    /// Frames handed to a receiver
    pub delivered: u64,
    /// Frames dropped for weak signal
    pub rejected: u64,
    /// Frames a receiver could not use
    pub errors: u64,
    /// Discovery restarts at the master
    pub resets: u64,
}

#[derive(Debug)]
struct SimNode {
    node: Node,
    radio: RecordingRadio,
    sensors: SimSensors,
    join_s: u64,
    leave_s: Option<u64>,
    powered: bool,
}

/// All nodes plus the medium between them
#[derive(Debug)]
pub struct Simulation {
    nodes: Vec<SimNode>,
    by_addr: HashMap<NodeAddress, usize>,
    medium: Medium,
    queue: VecDeque<(usize, Outbound)>,
    status: Vec<StatusEvent>,
    stats: Stats,
}

impl Simulation {
    /// Build the network; nothing is powered until [`Simulation::advance_to`]
    pub fn new(topology: &Topology) -> Self {
        let config = topology.node.clone();
        let mut nodes = vec![SimNode {
            node: Node::master(topology.master, config.clone()),
            radio: RecordingRadio::new(),
            sensors: SimSensors::new(topology.seed, 3700),
            join_s: 0,
            leave_s: None,
            powered: false,
        }];
        for (i, m) in topology.members.iter().enumerate() {
            nodes.push(SimNode {
                node: Node::member(m.address, config.clone()),
                radio: RecordingRadio::new(),
                sensors: SimSensors::new(topology.seed.wrapping_add(i as u64 + 1), m.battery_mv),
                join_s: m.join_s,
                leave_s: m.leave_s,
                powered: false,
            });
        }
        let by_addr = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node.address(), i))
            .collect();

        Self {
            nodes,
            by_addr,
            medium: Medium::new(&topology.links),
            queue: VecDeque::new(),
            status: Vec::new(),
            stats: Stats::default(),
        }
    }

    /// Apply power-on and power-off times up to `now_s` simulated seconds
    pub fn advance_to(&mut self, now_s: u64) {
        for sim in self.nodes.iter_mut() {
            let should_run = now_s >= sim.join_s && sim.leave_s.map_or(true, |t| now_s < t);
            if should_run == sim.powered {
                continue;
            }
            sim.powered = should_run;
            let addr = sim.node.address();
            self.medium.set_online(addr, should_run);
            if should_run {
                // boot from scratch
                let config = sim.node.config().clone();
                sim.node = Node::new(addr, sim.node.role(), config);
                sim.node.start();
                info!(%addr, t = now_s, "node powered on");
            } else {
                info!(%addr, t = now_s, "node powered off");
            }
        }
        self.collect_status(0);
    }

    /// Run one timer on every powered node, then deliver the fallout
    pub fn tick(&mut self, timer: Timer) {
        for i in 0..self.nodes.len() {
            let sim = &mut self.nodes[i];
            if !sim.powered {
                continue;
            }
            let radio = &mut sim.radio;
            let result = match (timer, sim.node.role()) {
                (Timer::Hello, Role::Master) => sim.node.on_hello_timer(radio),
                (Timer::Election, Role::Master) => sim.node.on_election_timer(radio),
                (Timer::Liveness, Role::Master) => {
                    if sim.node.on_liveness_timer() {
                        self.stats.resets += 1;
                    }
                    Ok(())
                }
                (Timer::Heartbeat, Role::Member) => sim.node.on_heartbeat_timer(radio),
                (Timer::Sensor, _) => sim.node.on_sensor_timer(radio, &mut sim.sensors),
                _ => Ok(()),
            };
            if let Err(e) = result {
                debug!(addr = %sim.node.address(), ?timer, error = %e, "timer action skipped");
            }
            self.collect(i);
        }
        self.pump();
    }

    /// Deliver queued frames until none are left
    pub fn pump(&mut self) {
        let mut deliveries = 0usize;
        while let Some((from, frame)) = self.queue.pop_front() {
            let src = self.nodes[from].node.address();
            for (dst, rssi) in self.medium.receivers(&src, &frame) {
                let Some(&to) = self.by_addr.get(&dst) else {
                    continue;
                };
                deliveries += 1;
                if deliveries > MAX_DELIVERIES_PER_PUMP {
                    warn!(pending = self.queue.len(), "delivery limit reached, dropping backlog");
                    self.queue.clear();
                    return;
                }

                let inbound = match frame.dest {
                    Some(dest) => InboundFrame::unicast(&frame.payload, src, dest, rssi),
                    None => InboundFrame::broadcast(&frame.payload, src, rssi),
                };
                let sim = &mut self.nodes[to];
                self.stats.delivered += 1;
                match sim.node.handle_frame(&mut sim.radio, &inbound) {
                    Ok(()) => {}
                    Err(Error::LinkRejected) => self.stats.rejected += 1,
                    Err(_) => self.stats.errors += 1,
                }
                self.collect(to);
            }
        }
    }

    fn collect(&mut self, i: usize) {
        let sent = self.nodes[i].radio.take();
        self.stats.sent += sent.len() as u64;
        self.queue.extend(sent.into_iter().map(|frame| (i, frame)));
        self.collect_status(i);
    }

    fn collect_status(&mut self, i: usize) {
        if i == 0 {
            let events = self.nodes[0].node.drain_events();
            self.status.extend(events);
        }
    }

    /// Status events from the master since the last call
    pub fn drain_status(&mut self) -> Vec<StatusEvent> {
        std::mem::take(&mut self.status)
    }

    /// The master node
    pub fn master(&self) -> &Node {
        &self.nodes[0].node
    }

    /// Node with address `addr`
    pub fn node(&self, addr: &NodeAddress) -> Option<&Node> {
        self.by_addr.get(addr).map(|&i| &self.nodes[i].node)
    }

    /// Traffic counters so far
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Drive the network in real time for `duration` of simulated time
    ///
    /// `speed` compresses time: 10.0 runs ten simulated seconds per real
    /// second. Every status event is passed to `on_status` as it happens.
    pub async fn run<F>(&mut self, duration: Duration, speed: f64, mut on_status: F) -> Stats
    where
        F: FnMut(&StatusEvent),
    {
        let config = self.master().config().clone();
        let scale = |d: Duration| d.div_f64(speed).max(Duration::from_millis(1));
        let timer = |d: Duration| {
            let mut t = interval(scale(d));
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        };
        let mut hello = timer(config.hello_interval());
        let mut election = timer(config.election_interval());
        let mut liveness = timer(config.liveness_interval());
        let mut heartbeat = timer(config.heartbeat_interval());
        let mut sensor = timer(config.sensor_interval());
        let mut membership = timer(Duration::from_secs(1));

        let start = Instant::now();
        let deadline = tokio::time::sleep(scale(duration));
        tokio::pin!(deadline);

        loop {
            let next = tokio::select! {
                _ = &mut deadline => break,
                _ = membership.tick() => None,
                _ = hello.tick() => Some(Timer::Hello),
                _ = election.tick() => Some(Timer::Election),
                _ = liveness.tick() => Some(Timer::Liveness),
                _ = heartbeat.tick() => Some(Timer::Heartbeat),
                _ = sensor.tick() => Some(Timer::Sensor),
            };

            let now_s = start.elapsed().mul_f64(speed).as_secs();
            self.advance_to(now_s);
            if let Some(t) = next {
                self.tick(t);
            }
            for event in self.drain_status() {
                on_status(&event);
            }
        }

        let master = self.master();
        info!(
            state = %master.state(),
            nodes = master.liveness().known_count(),
            heads = ?master.election().map(|e| e.heads.clone()),
            "simulation finished"
        );
        self.stats
    }

    /// True once the master has settled and every powered member installed a route
    pub fn converged(&self) -> bool {
        self.master().state() == DiscoveryState::Stable
            && self
                .nodes
                .iter()
                .skip(1)
                .filter(|n| n.powered)
                .all(|n| n.node.assigned_head().is_some())
    }
}
