//! Simulation description
//!
//! A JSON file names the master, the members, the radio links between them
//! and optional protocol overrides:
//!
//! ```json
//! {
//!   "duration_s": 120,
//!   "seed": 7,
//!   "master": "1",
//!   "members": [
//!     { "address": "2", "battery_mv": 3600 },
//!     { "address": "3", "battery_mv": 3300, "leave_s": 60 }
//!   ],
//!   "links": [
//!     { "a": "1", "b": "2", "rssi": -55 },
//!     { "a": "2", "b": "3", "rssi": -62 }
//!   ],
//!   "node": { "stable_after_rounds": 3 }
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use leach_core::{Metric, NodeAddress, NodeConfig, MAX_NODES};
use serde::{Deserialize, Serialize};

/// One simulated member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSpec {
    /// Hardware address
    pub address: NodeAddress,
    /// Starting battery voltage
    #[serde(default = "default_battery_mv")]
    pub battery_mv: i32,
    /// Power-on time, seconds of simulated time
    #[serde(default)]
    pub join_s: u64,
    /// Power-off time, if the node dies during the run
    #[serde(default)]
    pub leave_s: Option<u64>,
}

/// Symmetric radio link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// One end
    pub a: NodeAddress,
    /// Other end
    pub b: NodeAddress,
    /// Received signal strength in both directions (dBm)
    pub rssi: Metric,
}

/// Whole simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Run length, seconds of simulated time
    #[serde(default = "default_duration_s")]
    pub duration_s: u64,
    /// Seed for the simulated sensors
    #[serde(default)]
    pub seed: u64,
    /// Master address
    pub master: NodeAddress,
    /// Members, at most `MAX_NODES - 1`
    pub members: Vec<MemberSpec>,
    /// Radio links
    pub links: Vec<LinkSpec>,
    /// Protocol configuration shared by every node
    #[serde(default)]
    pub node: NodeConfig,
}

fn default_battery_mv() -> i32 {
    3600
}

fn default_duration_s() -> u64 {
    120
}

impl Topology {
    /// Read and validate a topology file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading topology {}", path.display()))?;
        let topology: Topology = serde_json::from_str(&text)
            .with_context(|| format!("parsing topology {}", path.display()))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Check addresses, links and protocol settings
    pub fn validate(&self) -> Result<()> {
        if self.members.len() + 1 > MAX_NODES {
            bail!(
                "{} members configured, the network holds at most {}",
                self.members.len(),
                MAX_NODES - 1
            );
        }

        let mut seen = HashSet::new();
        seen.insert(self.master);
        for m in &self.members {
            if !seen.insert(m.address) {
                bail!("duplicate node address {}", m.address);
            }
            if let Some(leave) = m.leave_s {
                if leave <= m.join_s {
                    bail!("node {} leaves before it joins", m.address);
                }
            }
        }

        for link in &self.links {
            if link.a == link.b {
                bail!("link from {} to itself", link.a);
            }
            for end in [link.a, link.b] {
                if !seen.contains(&end) {
                    bail!("link end {end} is not a configured node");
                }
            }
        }

        self.node
            .validate()
            .map_err(|e| anyhow::anyhow!("node configuration: {e}"))?;
        Ok(())
    }

    /// Every configured address, master first
    pub fn addresses(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        std::iter::once(self.master).chain(self.members.iter().map(|m| m.address))
    }
}
