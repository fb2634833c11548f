//! Node coordinator
//!
//! Owns every piece of per-node state and routes received frames and timer
//! ticks to it. The radio is passed into each call; the node itself never
//! blocks and never spawns anything.
//!
//! # Master
//!
//! ```text
//! hello tick    -> HELLO flood while FLOODING, STABLE after quiet rounds
//! REPORT        -> index table, adjacency matrix, local table
//! election tick -> heads, groups, route tree, permanent table, ADVERTISE
//! liveness tick -> miss counters, discovery restart on a silent node
//! ```
//!
//! # Member
//!
//! ```text
//! HELLO         -> record, re-flood, answer with REPORT
//! ADVERTISE     -> install permanent route, or forward toward its target
//! other frames  -> forward master-ward
//! ```

use heapless::Vec;
use tracing::{debug, info, trace, warn};

use crate::adjacency::{AdjacencyMatrix, NodeIndexTable};
use crate::config::NodeConfig;
use crate::discovery::{Discovery, HelloTick, HelloVerdict};
use crate::election::{choose_cluster_heads, Assignment, ElectionResult};
use crate::grouping::{assign_groups, build_route_tree, Uplink};
use crate::heartbeat::LivenessMonitor;
use crate::packet::{Advertise, Frame, Heartbeat, Hello, NewNode, Report, SensorData, Wire};
use crate::radio::{InboundFrame, Radio};
use crate::routing::{PatchOutcome, RoutingEntry, RoutingTable, TableKind};
use crate::sensor::{SensorReading, SensorSampler, Sensors};
use crate::status::{ResetReason, StatusEvent};
use crate::types::*;

// ============================================================================
// Node
// ============================================================================

/// One network node, master or member
#[derive(Debug)]
pub struct Node {
    address: NodeAddress,
    role: Role,
    config: NodeConfig,
    discovery: Discovery,
    local: RoutingTable,
    permanent: RoutingTable,

    // master side
    index: NodeIndexTable,
    adjacency: AdjacencyMatrix,
    liveness: LivenessMonitor,
    battery_mv: [Option<i32>; MAX_NODES],
    uplinks: [Option<NodeIndex>; MAX_NODES],
    election: Option<ElectionResult>,
    events: std::vec::Vec<StatusEvent>,

    // member side
    master: Option<NodeAddress>,
    assigned_head: Option<NodeAddress>,
    sampler: SensorSampler,
}

impl Node {
    /// Create a node
    pub fn new(address: NodeAddress, role: Role, config: NodeConfig) -> Self {
        let hysteresis = config.metric_hysteresis;
        Self {
            address,
            role,
            discovery: Discovery::new(),
            local: RoutingTable::new(address).with_hysteresis(hysteresis),
            permanent: RoutingTable::empty(address).with_hysteresis(hysteresis),
            index: NodeIndexTable::new(address),
            adjacency: AdjacencyMatrix::new(),
            liveness: LivenessMonitor::new(config.heartbeat_tolerance),
            battery_mv: [None; MAX_NODES],
            uplinks: [None; MAX_NODES],
            election: None,
            events: std::vec::Vec::new(),
            master: match role {
                Role::Master => Some(address),
                Role::Member => None,
            },
            assigned_head: None,
            sampler: SensorSampler::new(),
            config,
        }
    }

    /// Create the network master
    pub fn master(address: NodeAddress, config: NodeConfig) -> Self {
        Self::new(address, Role::Master, config)
    }

    /// Create a member node
    pub fn member(address: NodeAddress, config: NodeConfig) -> Self {
        Self::new(address, Role::Member, config)
    }

    /// Power-on; the master starts its first discovery round
    pub fn start(&mut self) {
        match self.role {
            Role::Master => self.restart_discovery(ResetReason::Startup),
            Role::Member => debug!(addr = %self.address, "member idle, waiting for HELLO"),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Own address
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    /// Master or member
    pub fn role(&self) -> Role {
        self.role
    }

    /// Active configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Discovery state
    pub fn state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Discovery-time routes
    pub fn local_table(&self) -> &RoutingTable {
        &self.local
    }

    /// Election-time routes
    pub fn permanent_table(&self) -> &RoutingTable {
        &self.permanent
    }

    /// Next hop toward `dest` in the selected table
    pub fn next_hop(&self, dest: &NodeAddress, kind: TableKind) -> Option<NodeAddress> {
        match kind {
            TableKind::Local => self.local.next_hop(dest),
            TableKind::Permanent => self.permanent.next_hop(dest),
        }
    }

    /// Address to index mapping (master)
    pub fn index_table(&self) -> &NodeIndexTable {
        &self.index
    }

    /// Adjacency matrix (master)
    pub fn adjacency(&self) -> &AdjacencyMatrix {
        &self.adjacency
    }

    /// Liveness counters (master)
    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Last election result (master)
    pub fn election(&self) -> Option<&ElectionResult> {
        self.election.as_ref()
    }

    /// Last battery reading of `node`, millivolts (master)
    pub fn battery_mv(&self, node: NodeIndex) -> Option<i32> {
        self.battery_mv.get(node as usize).copied().flatten()
    }

    /// Master address, once a HELLO was accepted
    pub fn master_address(&self) -> Option<NodeAddress> {
        self.master
    }

    /// Head assigned by the last advertisement (member)
    pub fn assigned_head(&self) -> Option<NodeAddress> {
        self.assigned_head
    }

    /// Take the status events queued since the last call
    pub fn drain_events(&mut self) -> std::vec::Vec<StatusEvent> {
        core::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------------
    // Frame Dispatch
    // ------------------------------------------------------------------------

    /// Handle one frame from the radio
    ///
    /// Frames at or below the RSSI threshold are dropped before decoding.
    /// Every error is logged here or at the drop point and returned so
    /// the caller can count it; none of them leave state half-updated.
    pub fn handle_frame<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
    ) -> Result<()> {
        if frame.rssi <= self.config.rssi_threshold {
            debug!(src = %frame.src, rssi = frame.rssi, "weak link, frame dropped");
            return Err(Error::LinkRejected);
        }
        if let Some(dest) = frame.dest {
            if dest != self.address {
                trace!(src = %frame.src, %dest, "overheard unicast ignored");
                return Ok(());
            }
        }

        let decoded = match Frame::decode(frame.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(src = %frame.src, len = frame.payload.len(), error = %e, "frame dropped");
                return Err(e);
            }
        };
        trace!(src = %frame.src, kind = ?decoded.frame_type(), rssi = frame.rssi, "rx");
        self.note_traffic(&frame.src);

        match decoded {
            Frame::Hello(hello) => self.on_hello(radio, frame, hello),
            Frame::Report(report) => self.on_report(radio, frame, report),
            Frame::SensorData(data) => self.on_sensor_data(radio, frame, data),
            Frame::Advertise(adv) => self.on_advertise(radio, frame, adv),
            Frame::Heartbeat(hb) => self.on_heartbeat(radio, frame, hb),
            Frame::NewNode(nn) => self.on_new_node(radio, frame, nn),
        }
    }

    fn on_hello<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
        hello: Hello,
    ) -> Result<()> {
        if self.role == Role::Master {
            trace!(src = %frame.src, "HELLO echo ignored");
            return Ok(());
        }

        let known = self.local.contains(&frame.src);
        match self.discovery.accept_hello(hello.sequence, known) {
            HelloVerdict::StaleKnown => {
                trace!(src = %frame.src, seq = hello.sequence, "duplicate HELLO");
                return Ok(());
            }
            HelloVerdict::StaleUnknown => {
                self.learn(frame.src, frame.src, 1, frame.rssi, hello.sequence);
                return Ok(());
            }
            HelloVerdict::RoundRestart => {
                info!(addr = %self.address, seq = hello.sequence, "new discovery round");
                self.local.reset();
                self.permanent.clear();
                self.assigned_head = None;
            }
            HelloVerdict::Fresh => {}
        }

        self.master = Some(hello.src_master);
        self.learn(frame.src, frame.src, 1, frame.rssi, hello.sequence);
        if frame.src != hello.src_master {
            let hops = hello.hop_count.saturating_add(1);
            self.learn(hello.src_master, frame.src, hops, frame.rssi, hello.sequence);
        }

        let flood = Hello {
            hop_count: hello.hop_count.saturating_add(1),
            ..hello
        };
        Self::broadcast(radio, &flood.to_bytes())?;

        let report = Report {
            src: self.address,
            entries: self.local.entries().iter().copied().collect(),
        };
        Self::unicast(radio, frame.src, &report.to_bytes())
    }

    fn on_report<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
        report: Report,
    ) -> Result<()> {
        if self.role == Role::Member {
            let depth = self
                .master
                .and_then(|m| report.entry(&m))
                .map(|e| e.hop_count);
            self.learn_downlink(frame, report.src, depth, report.sequence());
            return self.forward_to_master(radio, frame);
        }
        if report.src == self.address {
            return Ok(());
        }

        let origin = match self.index.get_or_assign(report.src) {
            Ok((idx, _)) => idx,
            Err(e) => {
                warn!(addr = %report.src, "index table exhausted, REPORT dropped");
                return Err(e);
            }
        };
        // first REPORT of this round from the node
        if !self.liveness.is_known(origin) {
            self.discovery.note_discovery();
            info!(node = origin, addr = %report.src, "node discovered");
        }
        self.liveness.mark_known(origin);
        self.liveness.heard(origin);

        let depth = report
            .entry(&self.address)
            .map_or(1, |e| e.hop_count)
            .max(1);
        for entry in report.entries.iter() {
            if entry.dest == report.src {
                continue;
            }
            if entry.dest == self.address {
                self.uplinks[origin as usize] = self.index.index_of(&entry.next_hop);
                if entry.hop_count == 1 {
                    self.record_link(origin, MASTER_INDEX, entry.metric);
                }
                continue;
            }
            if entry.hop_count == 1 {
                match self.index.get_or_assign(entry.dest) {
                    Ok((idx, new)) => {
                        if new {
                            self.discovery.note_discovery();
                            debug!(node = idx, addr = %entry.dest, "neighbour indexed");
                        }
                        self.record_link(origin, idx, entry.metric);
                    }
                    Err(_) => {
                        warn!(addr = %entry.dest, "index table exhausted, neighbour skipped");
                        continue;
                    }
                }
            }
            self.learn(
                entry.dest,
                frame.src,
                depth.saturating_add(entry.hop_count),
                entry.metric,
                entry.sequence,
            );
        }
        self.learn(report.src, frame.src, depth, frame.rssi, report.sequence());
        Ok(())
    }

    fn on_sensor_data<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
        data: SensorData,
    ) -> Result<()> {
        if self.role == Role::Member {
            self.learn_downlink(frame, data.source, None, 0);
            return self.forward_to_master(radio, frame);
        }

        let Some(node) = self.index.index_of(&data.source) else {
            debug!(addr = %data.source, "sensor data from unknown node");
            return Err(Error::UnknownNode);
        };
        self.liveness.heard(node);
        self.record_battery(node, data.battery_mv);
        let battery_pct = self.battery_percent(node);
        debug!(
            node,
            temperature = data.temperature,
            light = data.light_lux,
            distance = data.distance,
            battery_pct,
            "sensor data"
        );
        self.events.push(StatusEvent::Sensor {
            node,
            temperature: data.temperature,
            light: data.light_lux,
            distance: data.distance,
            battery_pct,
        });
        Ok(())
    }

    fn on_advertise<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
        adv: Advertise,
    ) -> Result<()> {
        if self.role == Role::Master {
            trace!(src = %frame.src, "ADVERTISE echo ignored");
            return Ok(());
        }

        if adv.dest == self.address {
            let Some(master) = self.master else {
                warn!(src = %frame.src, "advertisement before any HELLO, dropped");
                return Err(Error::NoRoute);
            };
            let metric = self.local.get(&adv.next_hop).map_or(frame.rssi, |e| e.metric);
            self.permanent.clear();
            self.permanent.insert(RoutingEntry::new(
                master,
                adv.next_hop,
                adv.hop_count,
                metric,
                Sequence::from(adv.sequence),
            ))?;
            if self.assigned_head != Some(adv.assigned_head) {
                info!(
                    addr = %self.address,
                    head = %adv.assigned_head,
                    next_hop = %adv.next_hop,
                    hops = adv.hop_count,
                    "cluster assignment installed"
                );
            }
            self.assigned_head = Some(adv.assigned_head);
            self.discovery.settle();
            return Ok(());
        }

        match adv.after(&self.address) {
            Some(next) if next != frame.src => Self::unicast(radio, next, frame.payload),
            _ => {
                warn!(addr = %self.address, dest = %adv.dest, "not a relay for this advertisement, dropped");
                Err(Error::NoRoute)
            }
        }
    }

    fn on_heartbeat<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
        hb: Heartbeat,
    ) -> Result<()> {
        if self.role == Role::Member {
            self.learn_downlink(frame, hb.src, None, 0);
            return self.forward_to_master(radio, frame);
        }
        match self.index.index_of(&hb.src) {
            Some(node) => {
                trace!(node, "heartbeat");
                self.liveness.heard(node);
            }
            None => debug!(addr = %hb.src, "heartbeat from unknown node"),
        }
        Ok(())
    }

    fn on_new_node<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
        nn: NewNode,
    ) -> Result<()> {
        if self.role == Role::Member {
            if self.uplink().is_none() {
                trace!(addr = %nn.src, "join announcement, no route to relay it");
                return Ok(());
            }
            return self.forward_to_master(radio, frame);
        }
        if self.discovery.state() != DiscoveryState::Stable {
            debug!(addr = %nn.src, "join announcement during discovery ignored");
            return Ok(());
        }
        info!(addr = %nn.src, "new node announced");
        self.restart_discovery(ResetReason::NewNode);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    /// HELLO period (master)
    pub fn on_hello_timer<R: Radio + ?Sized>(&mut self, radio: &mut R) -> Result<()> {
        if self.role != Role::Master {
            return Ok(());
        }
        match self.discovery.on_hello_tick(self.config.stable_after_rounds) {
            HelloTick::Skip => Ok(()),
            HelloTick::Stabilised => {
                info!(
                    nodes = self.liveness.known_count(),
                    rounds = self.discovery.rounds(),
                    "topology stable"
                );
                self.events.push(StatusEvent::State(DiscoveryState::Stable));
                Ok(())
            }
            HelloTick::Send(sequence) => {
                debug!(seq = sequence, "HELLO flood");
                let hello = Hello {
                    src_master: self.address,
                    hop_count: 0,
                    sequence,
                };
                Self::broadcast(radio, &hello.to_bytes())
            }
        }
    }

    /// Election and advertisement period (master)
    ///
    /// The first tick after the network settles runs the election; later
    /// ticks re-send the advertisements when `readvertise` is set.
    pub fn on_election_timer<R: Radio + ?Sized>(&mut self, radio: &mut R) -> Result<()> {
        if self.role != Role::Master || self.discovery.state() != DiscoveryState::Stable {
            return Ok(());
        }
        if self.discovery.take_election() {
            match self.run_election() {
                Ok(()) => {}
                Err(Error::NoCandidates) => {
                    debug!("no election candidates, deferred");
                    self.discovery.defer_election();
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "election failed");
                    return Err(e);
                }
            }
        } else if !self.config.readvertise {
            return Ok(());
        }
        self.advertise(radio)
    }

    /// Liveness monitor period (master); true if discovery restarted
    pub fn on_liveness_timer(&mut self) -> bool {
        if self.role != Role::Master {
            return false;
        }
        if self.discovery.state() != DiscoveryState::Stable {
            self.liveness.clear_counters();
            return false;
        }
        match self.liveness.tick() {
            Some(dead) => {
                self.events.push(StatusEvent::Dead(dead));
                self.restart_discovery(ResetReason::Heartbeat);
                true
            }
            None => false,
        }
    }

    /// Heartbeat period (member)
    ///
    /// An idle member announces itself with NEW_NODE instead.
    pub fn on_heartbeat_timer<R: Radio + ?Sized>(&mut self, radio: &mut R) -> Result<()> {
        if self.role != Role::Member {
            return Ok(());
        }
        if self.discovery.state() == DiscoveryState::Idle {
            trace!(addr = %self.address, "join announcement");
            let nn = NewNode { src: self.address };
            return Self::broadcast(radio, &nn.to_bytes());
        }
        let (Some(master), Some(next)) = (self.master, self.uplink()) else {
            debug!(addr = %self.address, "no route to master, heartbeat skipped");
            return Err(Error::NoRoute);
        };
        let hb = Heartbeat {
            src: self.address,
            dest: master,
        };
        Self::unicast(radio, next, &hb.to_bytes())
    }

    /// Sensor period
    ///
    /// The master only records its own battery. A member reports the window
    /// average, or an event sample at once.
    pub fn on_sensor_timer<R, S>(&mut self, radio: &mut R, sensors: &mut S) -> Result<()>
    where
        R: Radio + ?Sized,
        S: Sensors + ?Sized,
    {
        let reading = SensorReading::sample(sensors);
        if self.role == Role::Master {
            self.record_battery(MASTER_INDEX, reading.battery_mv);
            return Ok(());
        }
        let Some(avg) = self.sampler.push(reading) else {
            return Ok(());
        };
        let Some(next) = self.uplink() else {
            debug!(addr = %self.address, "no route to master, sensor data dropped");
            return Err(Error::NoRoute);
        };
        let data = SensorData {
            source: self.address,
            battery_mv: avg.battery_mv,
            temperature: avg.temperature,
            light_lux: avg.light_lux,
            distance: avg.distance_cm,
        };
        Self::unicast(radio, next, &data.to_bytes())
    }

    // ------------------------------------------------------------------------
    // Election (master)
    // ------------------------------------------------------------------------

    fn run_election(&mut self) -> Result<()> {
        let candidates: Vec<NodeIndex, MAX_NODES> = self.liveness.known().collect();
        let template = self.adjacency.template(&candidates)?;
        let links = self.adjacency.master_links(&candidates);
        let battery: Vec<Fixed, MAX_NODES> = candidates
            .iter()
            .map(|&n| self.battery_of(n))
            .collect();

        let selection = choose_cluster_heads(
            &template,
            &links,
            &battery,
            self.config.hop_weights,
            usize::from(self.config.head_count),
        )?;
        let grouping = assign_groups(&template, &links, &battery, &selection.heads)?;
        let preferred: Vec<Option<Uplink>, MAX_NODES> = candidates
            .iter()
            .map(|&n| match self.uplinks[n as usize] {
                Some(MASTER_INDEX) => Some(Uplink::Master),
                Some(up) => candidates.iter().position(|&c| c == up).map(Uplink::Node),
                None => None,
            })
            .collect();
        let tree = build_route_tree(&template, &links, &grouping, &preferred)?;

        let mut result = ElectionResult {
            epoch: self.discovery.next_epoch(),
            grade: selection.grade,
            ..Default::default()
        };
        result.heads = selection.heads.iter().map(|&h| candidates[h]).collect();

        for (pos, &node) in candidates.iter().enumerate() {
            let (Some(head), Some(parent), Some(hop_count)) =
                (grouping.head_of(pos), tree.parent(pos), tree.hop_count(pos))
            else {
                warn!(node, "unreachable, left out of election");
                continue;
            };
            let uplink = match parent {
                Uplink::Master => MASTER_INDEX,
                Uplink::Node(p) => candidates[p],
            };
            let assignment = Assignment {
                node,
                head: candidates[head],
                uplink,
                hop_count,
            };
            if result.assignments.push(assignment).is_err() {
                warn!(node, "assignment table full");
            }
        }
        result.assignments.sort_unstable_by_key(|a| (a.hop_count, a.node));

        self.permanent.reset();
        for (pos, &node) in candidates.iter().enumerate() {
            let (Some(first), Some(hops)) = (tree.first_hop(pos), tree.hop_count(pos)) else {
                continue;
            };
            let first = candidates[first];
            let (Some(dest), Some(next)) = (self.index.address(node), self.index.address(first))
            else {
                continue;
            };
            let metric = self.adjacency.link(MASTER_INDEX, first).unwrap_or(0);
            let entry = RoutingEntry::new(dest, next, hops, metric, Sequence::from(result.epoch));
            if self.permanent.insert(entry).is_err() {
                warn!(node, "permanent table full");
                continue;
            }
            self.events.push(StatusEvent::Route {
                dest: node,
                next: first,
                hops,
            });
        }

        for &head in result.heads.iter() {
            self.events.push(StatusEvent::Head(head));
        }
        for a in result.assignments.iter().filter(|a| a.node != a.head) {
            self.events.push(StatusEvent::Member {
                node: a.node,
                head: a.head,
            });
        }

        info!(
            epoch = result.epoch,
            heads = ?result.heads.as_slice(),
            grade = result.grade,
            nodes = result.assignments.len(),
            "cluster heads elected"
        );
        self.election = Some(result);
        Ok(())
    }

    fn advertise<R: Radio + ?Sized>(&mut self, radio: &mut R) -> Result<()> {
        let Some(result) = self.election.clone() else {
            return Ok(());
        };
        let mut sent = 0usize;
        for a in result.assignments.iter() {
            let (Some(dest), Some(head), Some(uplink)) = (
                self.index.address(a.node),
                self.index.address(a.head),
                self.index.address(a.uplink),
            ) else {
                continue;
            };
            let Some(relays) = result.relays(a.node) else {
                warn!(node = a.node, "uplink chain broken, advertisement skipped");
                continue;
            };
            let route: Option<Vec<NodeAddress, MAX_ROUTE_LEN>> =
                relays.iter().map(|&r| self.index.address(r)).collect();
            let Some(route) = route else {
                warn!(node = a.node, "relay without address, advertisement skipped");
                continue;
            };
            let adv = Advertise {
                dest,
                assigned_head: head,
                next_hop: uplink,
                hop_count: a.hop_count,
                sequence: result.epoch,
                route,
            };
            if Self::unicast(radio, adv.first_hop(), &adv.to_bytes()).is_ok() {
                sent += 1;
            }
        }
        debug!(epoch = result.epoch, sent, "advertisements sent");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn restart_discovery(&mut self, reason: ResetReason) {
        info!(%reason, "discovery restarted");
        self.adjacency.reset();
        self.local.reset();
        self.permanent.clear();
        self.election = None;
        self.liveness.forget_all();
        self.uplinks = [None; MAX_NODES];
        self.discovery.restart();
        self.events.push(StatusEvent::Reset(reason));
        self.events.push(StatusEvent::State(DiscoveryState::Flooding));
    }

    fn note_traffic(&mut self, src: &NodeAddress) {
        if self.role != Role::Master {
            return;
        }
        if let Some(idx) = self.index.index_of(src) {
            self.liveness.heard(idx);
        }
    }

    fn record_link(&mut self, a: NodeIndex, b: NodeIndex, metric: Metric) {
        match self.adjacency.set_link(a, b, metric) {
            Ok(true) => {
                debug!(a, b, metric, "link");
                self.events.push(StatusEvent::Link { a, b, metric });
            }
            Ok(false) => {}
            Err(e) => warn!(a, b, error = %e, "link not recorded"),
        }
    }

    fn record_battery(&mut self, node: NodeIndex, millivolts: i32) {
        if let Some(slot) = self.battery_mv.get_mut(node as usize) {
            *slot = Some(millivolts);
        }
    }

    fn battery_of(&self, node: NodeIndex) -> Fixed {
        self.battery_mv(node)
            .map_or(Fixed::ONE, |mv| battery_fraction(mv, self.config.full_battery_mv))
    }

    fn battery_percent(&self, node: NodeIndex) -> u8 {
        let pct = (self.battery_of(node) * Fixed::from_num(100)).to_num::<i32>();
        pct.clamp(0, 100) as u8
    }

    /// Patch the local table, logging a full table
    fn learn(
        &mut self,
        dest: NodeAddress,
        next_hop: NodeAddress,
        hop_count: u8,
        metric: Metric,
        sequence: Sequence,
    ) -> Option<PatchOutcome> {
        let entry = RoutingEntry::new(dest, next_hop, hop_count, metric, sequence);
        match self.local.patch_update(entry) {
            Ok(outcome) => {
                if outcome == PatchOutcome::Inserted {
                    trace!(owner = %self.address, %dest, %next_hop, hop_count, "route learned");
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(owner = %self.address, %dest, error = %e, "route dropped");
                None
            }
        }
    }

    /// Remember the way back to the originator of a relayed frame
    ///
    /// Neighbours are one hop away. A deeper origin is learned only when it
    /// states its own distance to the master.
    fn learn_downlink(
        &mut self,
        frame: &InboundFrame<'_>,
        origin: NodeAddress,
        origin_depth: Option<u8>,
        sequence: Sequence,
    ) {
        if origin == self.address {
            return;
        }
        let hops = if origin == frame.src {
            1
        } else {
            let own_depth = self
                .master
                .and_then(|m| self.local.get(&m))
                .map(|e| e.hop_count);
            match (origin_depth, own_depth) {
                (Some(theirs), Some(ours)) if theirs > ours => theirs - ours,
                _ => {
                    trace!(addr = %self.address, %origin, "downlink distance unknown, not learned");
                    return;
                }
            }
        };
        self.learn(origin, frame.src, hops, frame.rssi, sequence);
    }

    fn uplink(&self) -> Option<NodeAddress> {
        let master = self.master?;
        self.permanent
            .next_hop(&master)
            .or_else(|| self.local.next_hop(&master))
    }

    fn forward_to_master<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        frame: &InboundFrame<'_>,
    ) -> Result<()> {
        match self.uplink() {
            Some(next) if next != frame.src => Self::unicast(radio, next, frame.payload),
            Some(_) => {
                warn!(addr = %self.address, src = %frame.src, "uplink loops back to sender, dropped");
                Err(Error::NoRoute)
            }
            None => {
                warn!(addr = %self.address, "no route to master, frame dropped");
                Err(Error::NoRoute)
            }
        }
    }

    fn unicast<R: Radio + ?Sized>(radio: &mut R, dest: NodeAddress, payload: &[u8]) -> Result<()> {
        radio.send(dest, payload).map_err(|e| {
            warn!(%dest, error = %e, "send failed");
            e
        })
    }

    fn broadcast<R: Radio + ?Sized>(radio: &mut R, payload: &[u8]) -> Result<()> {
        radio.broadcast(payload).map_err(|e| {
            warn!(error = %e, "broadcast failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::RecordingRadio;

    fn addr(id: u16) -> NodeAddress {
        NodeAddress::from_node_id(id)
    }

    fn config() -> NodeConfig {
        NodeConfig {
            stable_after_rounds: 1,
            ..NodeConfig::default()
        }
    }

    /// REPORT from `src`: the master one hop away plus 1-hop neighbours
    fn report(src: u16, neighbours: &[(u16, Metric)]) -> std::vec::Vec<u8> {
        let mut entries: Vec<RoutingEntry, MAX_NODES> = Vec::new();
        entries.push(RoutingEntry::own(addr(src))).unwrap();
        entries
            .push(RoutingEntry::new(addr(1), addr(1), 1, -50, 1))
            .unwrap();
        for &(n, rssi) in neighbours {
            entries
                .push(RoutingEntry::new(addr(n), addr(n), 1, rssi, 1))
                .unwrap();
        }
        Report {
            src: addr(src),
            entries,
        }
        .to_bytes()
    }

    fn deliver(node: &mut Node, radio: &mut RecordingRadio, from: u16, bytes: &[u8]) -> Result<()> {
        let to = node.address();
        node.handle_frame(radio, &InboundFrame::unicast(bytes, addr(from), to, -50))
    }

    /// Master that has seen a full mesh of `members` and is STABLE
    fn stable_master(members: &[u16]) -> (Node, RecordingRadio) {
        let mut master = Node::master(addr(1), config());
        let mut radio = RecordingRadio::new();
        master.start();
        master.on_hello_timer(&mut radio).unwrap();
        for &m in members {
            let others: std::vec::Vec<(u16, Metric)> =
                members.iter().filter(|&&o| o != m).map(|&o| (o, -60)).collect();
            deliver(&mut master, &mut radio, m, &report(m, &others)).unwrap();
        }
        master.on_hello_timer(&mut radio).unwrap();
        master.on_hello_timer(&mut radio).unwrap();
        assert_eq!(master.state(), DiscoveryState::Stable);
        radio.take();
        (master, radio)
    }

    #[test]
    fn test_master_start_emits_reset() {
        let mut master = Node::master(addr(1), config());
        master.start();
        assert_eq!(master.state(), DiscoveryState::Flooding);
        assert_eq!(
            master.drain_events(),
            vec![
                StatusEvent::Reset(ResetReason::Startup),
                StatusEvent::State(DiscoveryState::Flooding)
            ]
        );
        assert!(master.drain_events().is_empty());
    }

    #[test]
    fn test_master_floods_hello() {
        let mut master = Node::master(addr(1), config());
        let mut radio = RecordingRadio::new();
        master.on_hello_timer(&mut radio).unwrap();
        assert!(radio.sent().is_empty());

        master.start();
        master.on_hello_timer(&mut radio).unwrap();
        let sent = radio.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, None);
        assert_eq!(
            Frame::decode(&sent[0].payload).unwrap(),
            Frame::Hello(Hello { src_master: addr(1), hop_count: 0, sequence: 1 })
        );
    }

    #[test]
    fn test_member_answers_hello() {
        let mut member = Node::member(addr(2), config());
        let mut radio = RecordingRadio::new();
        let hello = Hello { src_master: addr(1), hop_count: 0, sequence: 1 }.to_bytes();
        member
            .handle_frame(&mut radio, &InboundFrame::broadcast(&hello, addr(1), -55))
            .unwrap();

        assert_eq!(member.state(), DiscoveryState::Flooding);
        assert_eq!(member.master_address(), Some(addr(1)));
        assert_eq!(member.next_hop(&addr(1), TableKind::Local), Some(addr(1)));

        let sent = radio.take();
        assert_eq!(sent.len(), 2);
        // re-flood one hop further
        assert_eq!(
            Frame::decode(&sent[0].payload).unwrap(),
            Frame::Hello(Hello { src_master: addr(1), hop_count: 1, sequence: 1 })
        );
        // report back to the sender
        assert_eq!(sent[1].dest, Some(addr(1)));
        let Frame::Report(r) = Frame::decode(&sent[1].payload).unwrap() else {
            panic!("expected REPORT");
        };
        assert_eq!(r.src, addr(2));
        assert_eq!(r.entry(&addr(1)).unwrap().metric, -55);

        // duplicate is dropped silently
        member
            .handle_frame(&mut radio, &InboundFrame::broadcast(&hello, addr(1), -55))
            .unwrap();
        assert!(radio.sent().is_empty());
    }

    #[test]
    fn test_relayed_hello_adds_master_route() {
        let mut member = Node::member(addr(3), config());
        let mut radio = RecordingRadio::new();
        let hello = Hello { src_master: addr(1), hop_count: 1, sequence: 1 }.to_bytes();
        member
            .handle_frame(&mut radio, &InboundFrame::broadcast(&hello, addr(2), -60))
            .unwrap();
        let route = member.local_table().get(&addr(1)).unwrap();
        assert_eq!(route.next_hop, addr(2));
        assert_eq!(route.hop_count, 2);
    }

    #[test]
    fn test_weak_frame_rejected() {
        let mut master = Node::master(addr(1), config());
        let mut radio = RecordingRadio::new();
        master.start();
        let bytes = report(2, &[]);
        let weak = InboundFrame::unicast(&bytes, addr(2), addr(1), -80);
        assert_eq!(master.handle_frame(&mut radio, &weak), Err(Error::LinkRejected));
        assert!(master.adjacency().is_clean());
        assert!(master.local_table().is_self_only());
    }

    #[test]
    fn test_malformed_frame_rejected() {
        let mut master = Node::master(addr(1), config());
        let mut radio = RecordingRadio::new();
        let bytes = [5u8, 1, 2];
        assert!(matches!(
            deliver(&mut master, &mut radio, 2, &bytes),
            Err(Error::Malformed { .. })
        ));
        assert_eq!(deliver(&mut master, &mut radio, 2, &[42]), Err(Error::UnknownType(42)));
    }

    #[test]
    fn test_report_builds_adjacency() {
        let mut master = Node::master(addr(1), config());
        let mut radio = RecordingRadio::new();
        master.start();
        master.drain_events();
        deliver(&mut master, &mut radio, 2, &report(2, &[(3, -65)])).unwrap();

        let idx2 = master.index_table().index_of(&addr(2)).unwrap();
        let idx3 = master.index_table().index_of(&addr(3)).unwrap();
        assert_eq!(master.adjacency().link(idx2, MASTER_INDEX), Some(-50));
        assert_eq!(master.adjacency().link(idx2, idx3), Some(-65));
        assert!(master.adjacency().is_symmetric());
        assert!(master.liveness().is_known(idx2));
        assert!(!master.liveness().is_known(idx3));
        assert_eq!(master.next_hop(&addr(3), TableKind::Local), Some(addr(2)));

        let events = master.drain_events();
        assert!(events.contains(&StatusEvent::Link { a: idx2, b: idx3, metric: -65 }));
    }

    #[test]
    fn test_election_installs_permanent_routes() {
        let (mut master, mut radio) = stable_master(&[2, 3, 4, 5]);
        master.drain_events();
        master.on_election_timer(&mut radio).unwrap();

        let result = master.election().unwrap().clone();
        assert_eq!(result.heads.len(), HEAD_COUNT);
        assert_eq!(result.grade, 6);
        assert_eq!(result.assignments.len(), 4);
        for a in result.assignments.iter() {
            let dest = master.index_table().address(a.node).unwrap();
            assert!(master.next_hop(&dest, TableKind::Permanent).is_some());
        }

        // one advertisement per node
        let sent = radio.take();
        assert_eq!(sent.len(), 4);
        assert!(sent
            .iter()
            .all(|o| matches!(Frame::decode(&o.payload), Ok(Frame::Advertise(_)))));

        let events = master.drain_events();
        assert_eq!(events.iter().filter(|e| matches!(e, StatusEvent::Head(_))).count(), 3);
        assert_eq!(events.iter().filter(|e| matches!(e, StatusEvent::Member { .. })).count(), 1);

        // later ticks re-advertise without re-electing
        master.on_election_timer(&mut radio).unwrap();
        assert_eq!(radio.take().len(), 4);
        assert_eq!(master.election().unwrap().epoch, result.epoch);
    }

    #[test]
    fn test_election_deferred_without_candidates() {
        let (mut master, mut radio) = stable_master(&[]);
        master.on_election_timer(&mut radio).unwrap();
        assert!(master.election().is_none());
        assert!(radio.sent().is_empty());
    }

    #[test]
    fn test_member_installs_advertisement() {
        let mut member = Node::member(addr(3), config());
        let mut radio = RecordingRadio::new();
        let hello = Hello { src_master: addr(1), hop_count: 1, sequence: 1 }.to_bytes();
        member
            .handle_frame(&mut radio, &InboundFrame::broadcast(&hello, addr(2), -60))
            .unwrap();
        radio.take();

        let adv = Advertise {
            dest: addr(3),
            assigned_head: addr(2),
            next_hop: addr(2),
            hop_count: 2,
            sequence: 1,
            route: Vec::from_slice(&[addr(2)]).unwrap(),
        }
        .to_bytes();
        deliver(&mut member, &mut radio, 2, &adv).unwrap();
        assert_eq!(member.state(), DiscoveryState::Stable);
        assert_eq!(member.assigned_head(), Some(addr(2)));
        assert_eq!(member.next_hop(&addr(1), TableKind::Permanent), Some(addr(2)));
        assert_eq!(member.permanent_table().len(), 1);
    }

    #[test]
    fn test_member_forwards_advertisement() {
        let mut member = Node::member(addr(2), config());
        let mut radio = RecordingRadio::new();
        let hello = Hello { src_master: addr(1), hop_count: 0, sequence: 1 }.to_bytes();
        member
            .handle_frame(&mut radio, &InboundFrame::broadcast(&hello, addr(1), -50))
            .unwrap();
        radio.take();

        let adv = Advertise {
            dest: addr(3),
            assigned_head: addr(2),
            next_hop: addr(2),
            hop_count: 2,
            sequence: 1,
            route: Vec::from_slice(&[addr(2)]).unwrap(),
        }
        .to_bytes();
        deliver(&mut member, &mut radio, 1, &adv).unwrap();
        let sent = radio.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, Some(addr(3)));
        assert_eq!(sent[0].payload, adv);
    }

    #[test]
    fn test_relay_follows_advertised_route() {
        let mut relay = Node::member(addr(3), config());
        let mut radio = RecordingRadio::new();
        let adv = Advertise {
            dest: addr(6),
            assigned_head: addr(5),
            next_hop: addr(5),
            hop_count: 4,
            sequence: 1,
            route: Vec::from_slice(&[addr(2), addr(3), addr(4), addr(5)]).unwrap(),
        }
        .to_bytes();
        deliver(&mut relay, &mut radio, 2, &adv).unwrap();
        let sent = radio.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, Some(addr(4)));
        assert_eq!(sent[0].payload, adv);

        // echoed back by the next relay
        assert_eq!(deliver(&mut relay, &mut radio, 4, &adv), Err(Error::NoRoute));

        // not on the route at all
        let mut bystander = Node::member(addr(7), config());
        assert_eq!(deliver(&mut bystander, &mut radio, 2, &adv), Err(Error::NoRoute));
        assert!(radio.sent().is_empty());
    }

    #[test]
    fn test_deep_report_learns_its_distance() {
        let mut relay = Node::member(addr(3), config());
        let mut radio = RecordingRadio::new();
        let hello = Hello { src_master: addr(1), hop_count: 1, sequence: 1 }.to_bytes();
        relay
            .handle_frame(&mut radio, &InboundFrame::broadcast(&hello, addr(2), -60))
            .unwrap();
        radio.take();

        // node 6 sits five hops out, behind node 4
        let mut entries: Vec<RoutingEntry, MAX_NODES> = Vec::new();
        entries.push(RoutingEntry::own(addr(6))).unwrap();
        entries
            .push(RoutingEntry::new(addr(1), addr(5), 5, -60, 1))
            .unwrap();
        let bytes = Report { src: addr(6), entries }.to_bytes();
        deliver(&mut relay, &mut radio, 4, &bytes).unwrap();

        let route = relay.local_table().get(&addr(6)).unwrap();
        assert_eq!(route.next_hop, addr(4));
        assert_eq!(route.hop_count, 3);

        // a relayed heartbeat gives no distance
        let hb = Heartbeat { src: addr(8), dest: addr(1) }.to_bytes();
        deliver(&mut relay, &mut radio, 4, &hb).unwrap();
        assert!(relay.local_table().get(&addr(8)).is_none());
    }

    #[test]
    fn test_restart_drops_routes_and_election() {
        let (mut master, mut radio) = stable_master(&[2, 3, 4, 5]);
        master.on_election_timer(&mut radio).unwrap();
        assert!(master.election().is_some());
        assert!(!master.permanent_table().is_empty());

        assert!(!master.on_liveness_timer());
        assert!(!master.on_liveness_timer());
        assert!(master.on_liveness_timer());
        assert_eq!(master.state(), DiscoveryState::Flooding);
        assert!(master.election().is_none());
        assert!(master.permanent_table().is_empty());
    }

    #[test]
    fn test_liveness_timeout_restarts_discovery() {
        let (mut master, _) = stable_master(&[2, 3]);
        master.drain_events();
        let idx2 = master.index_table().index_of(&addr(2)).unwrap();
        let idx3 = master.index_table().index_of(&addr(3)).unwrap();

        assert!(!master.on_liveness_timer());
        assert!(!master.on_liveness_timer());
        // node 2 still talks, node 3 stays silent
        let hb = Heartbeat { src: addr(2), dest: addr(1) }.to_bytes();
        let mut radio = RecordingRadio::new();
        deliver(&mut master, &mut radio, 2, &hb).unwrap();
        assert_eq!(master.liveness().missed(idx2), 0);
        assert!(master.on_liveness_timer());

        assert_eq!(master.state(), DiscoveryState::Flooding);
        assert!(master.adjacency().is_clean());
        assert!(master.local_table().is_self_only());
        let events = master.drain_events();
        assert_eq!(events[0], StatusEvent::Dead(idx3));
        assert_eq!(events[1], StatusEvent::Reset(ResetReason::Heartbeat));
    }

    #[test]
    fn test_liveness_idle_while_flooding() {
        let mut master = Node::master(addr(1), config());
        let mut radio = RecordingRadio::new();
        master.start();
        deliver(&mut master, &mut radio, 2, &report(2, &[])).unwrap();
        for _ in 0..10 {
            assert!(!master.on_liveness_timer());
        }
        assert_eq!(master.state(), DiscoveryState::Flooding);
    }

    #[test]
    fn test_new_node_restarts_stable_network() {
        let (mut master, mut radio) = stable_master(&[2]);
        master.drain_events();
        let nn = NewNode { src: addr(9) }.to_bytes();
        deliver(&mut master, &mut radio, 2, &nn).unwrap();
        assert_eq!(master.state(), DiscoveryState::Flooding);
        assert_eq!(master.drain_events()[0], StatusEvent::Reset(ResetReason::NewNode));

        // ignored while flooding
        deliver(&mut master, &mut radio, 2, &nn).unwrap();
        assert!(master.drain_events().is_empty());
    }

    #[test]
    fn test_idle_member_announces_itself() {
        let mut member = Node::member(addr(5), config());
        let mut radio = RecordingRadio::new();
        member.on_heartbeat_timer(&mut radio).unwrap();
        let sent = radio.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, None);
        assert_eq!(
            Frame::decode(&sent[0].payload).unwrap(),
            Frame::NewNode(NewNode { src: addr(5) })
        );
    }

    #[test]
    fn test_member_relays_heartbeat() {
        let mut member = Node::member(addr(2), config());
        let mut radio = RecordingRadio::new();
        let hello = Hello { src_master: addr(1), hop_count: 0, sequence: 1 }.to_bytes();
        member
            .handle_frame(&mut radio, &InboundFrame::broadcast(&hello, addr(1), -50))
            .unwrap();
        radio.take();

        member.on_heartbeat_timer(&mut radio).unwrap();
        let hb = Heartbeat { src: addr(3), dest: addr(1) }.to_bytes();
        deliver(&mut member, &mut radio, 3, &hb).unwrap();

        let sent = radio.take();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|o| o.dest == Some(addr(1))));
        assert_eq!(sent[1].payload, hb);
        // the relay now knows how to reach node 3
        assert_eq!(member.next_hop(&addr(3), TableKind::Local), Some(addr(3)));
    }

    #[test]
    fn test_master_records_sensor_data() {
        let (mut master, mut radio) = stable_master(&[2]);
        master.drain_events();
        let data = SensorData {
            source: addr(2),
            battery_mv: 1850,
            temperature: 21,
            light_lux: 340,
            distance: 35,
        }
        .to_bytes();
        deliver(&mut master, &mut radio, 2, &data).unwrap();

        let idx = master.index_table().index_of(&addr(2)).unwrap();
        assert_eq!(master.battery_mv(idx), Some(1850));
        assert_eq!(
            master.drain_events(),
            vec![StatusEvent::Sensor { node: idx, temperature: 21, light: 340, distance: 35, battery_pct: 50 }]
        );

        let unknown = SensorData { source: addr(7), ..SensorData::default() }.to_bytes();
        assert_eq!(deliver(&mut master, &mut radio, 2, &unknown), Err(Error::UnknownNode));
    }

    #[test]
    fn test_member_without_route_drops_sensor_data() {
        struct Flat;
        impl Sensors for Flat {
            fn battery_millivolts(&mut self) -> i32 {
                3600
            }
            fn temperature(&mut self) -> i32 {
                20
            }
            fn light_raw(&mut self) -> i32 {
                1000
            }
            fn distance_raw(&mut self) -> i32 {
                1000
            }
        }

        let mut member = Node::member(addr(2), config());
        let mut radio = RecordingRadio::new();
        let mut sensors = Flat;
        member.on_sensor_timer(&mut radio, &mut sensors).unwrap();
        member.on_sensor_timer(&mut radio, &mut sensors).unwrap();
        assert_eq!(member.on_sensor_timer(&mut radio, &mut sensors), Err(Error::NoRoute));
        assert!(radio.sent().is_empty());
    }
}
