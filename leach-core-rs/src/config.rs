//! Node configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Default RSSI rejection threshold (dBm); frames at or below are dropped
pub const DEFAULT_RSSI_THRESHOLD: Metric = -80;

/// Default metric delta required before a stored metric is overwritten
pub const DEFAULT_METRIC_HYSTERESIS: Metric = 5;

/// Default connectivity weights for 1-, 2- and 3-hop walks
pub const DEFAULT_HOP_WEIGHTS: [u32; 3] = [8, 4, 2];

/// Battery voltage treated as a full charge (mV)
pub const DEFAULT_FULL_BATTERY_MV: i32 = 3700;

/// Per-node protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Frames with RSSI at or below this value are dropped
    pub rssi_threshold: Metric,
    /// Master HELLO period
    pub hello_interval_ms: u64,
    /// Consecutive HELLO rounds without a new node before STABLE
    pub stable_after_rounds: u8,
    /// Master election / advertisement period
    pub election_interval_ms: u64,
    /// Re-send advertisements on every election tick while STABLE
    pub readvertise: bool,
    /// Master liveness monitor period
    pub liveness_interval_ms: u64,
    /// Silent monitor ticks before a node is declared dead
    pub heartbeat_tolerance: u8,
    /// Member heartbeat period
    pub heartbeat_interval_ms: u64,
    /// Sensor sampling period
    pub sensor_interval_ms: u64,
    /// Routing metric hysteresis
    pub metric_hysteresis: Metric,
    /// Cluster heads per election (at most 3)
    pub head_count: u8,
    /// Weights for 1-, 2- and 3-hop reachability
    pub hop_weights: [u32; 3],
    /// Battery voltage treated as full charge
    pub full_battery_mv: i32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            hello_interval_ms: 2_000,
            stable_after_rounds: 5,
            election_interval_ms: 3_000,
            readvertise: true,
            liveness_interval_ms: 10_000,
            heartbeat_tolerance: 3,
            heartbeat_interval_ms: 3_000,
            sensor_interval_ms: 3_000,
            metric_hysteresis: DEFAULT_METRIC_HYSTERESIS,
            head_count: HEAD_COUNT as u8,
            hop_weights: DEFAULT_HOP_WEIGHTS,
            full_battery_mv: DEFAULT_FULL_BATTERY_MV,
        }
    }
}

impl NodeConfig {
    /// Check ranges that the protocol cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.head_count == 0 || self.head_count as usize > HEAD_COUNT {
            return Err(Error::InvalidArg);
        }
        if self.heartbeat_tolerance == 0 || self.stable_after_rounds == 0 {
            return Err(Error::InvalidArg);
        }
        if self.metric_hysteresis < 0 || self.full_battery_mv <= 0 {
            return Err(Error::InvalidArg);
        }
        let intervals = [
            self.hello_interval_ms,
            self.election_interval_ms,
            self.liveness_interval_ms,
            self.heartbeat_interval_ms,
            self.sensor_interval_ms,
        ];
        if intervals.contains(&0) {
            return Err(Error::InvalidArg);
        }
        Ok(())
    }

    /// HELLO period
    pub fn hello_interval(&self) -> Duration {
        Duration::from_millis(self.hello_interval_ms)
    }

    /// Election period
    pub fn election_interval(&self) -> Duration {
        Duration::from_millis(self.election_interval_ms)
    }

    /// Liveness monitor period
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    /// Heartbeat period
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Sensor period
    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms)
    }
}
