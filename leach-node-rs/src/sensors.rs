//! Simulated sensor board
//!
//! Battery drains a little on every sample, temperature wanders around
//! 21 C, and now and then something walks past the ranger under a lamp.

use leach_core::sensor::ADC_MAX;
use leach_core::Sensors;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Millivolts lost per sample
const DRAIN_PER_SAMPLE_MV: i32 = 2;

/// Chance per sample that an object passes the sensors
const EVENT_PROBABILITY: f64 = 0.05;

/// Deterministic sensor source for one node
#[derive(Debug)]
pub struct SimSensors {
    rng: StdRng,
    battery_mv: i32,
    light_raw: i32,
    distance_raw: i32,
    event: bool,
}

impl SimSensors {
    /// Sensors seeded per node so runs are reproducible
    pub fn new(seed: u64, battery_mv: i32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            battery_mv,
            light_raw: 800,
            distance_raw: 700,
            event: false,
        }
    }

    /// Current battery voltage without draining
    pub fn battery(&self) -> i32 {
        self.battery_mv
    }
}

impl Sensors for SimSensors {
    fn battery_millivolts(&mut self) -> i32 {
        self.battery_mv = (self.battery_mv - DRAIN_PER_SAMPLE_MV).max(0);
        // an event lasts one sample
        self.event = self.rng.gen_bool(EVENT_PROBABILITY);
        self.battery_mv
    }

    fn temperature(&mut self) -> i32 {
        21 + self.rng.gen_range(-2..=2)
    }

    fn light_raw(&mut self) -> i32 {
        if self.event {
            return ADC_MAX;
        }
        self.light_raw = (self.light_raw + self.rng.gen_range(-40..=40)).clamp(0, ADC_MAX);
        self.light_raw
    }

    fn distance_raw(&mut self) -> i32 {
        if self.event {
            return 3000;
        }
        self.distance_raw = (self.distance_raw + self.rng.gen_range(-30..=30)).clamp(560, 3250);
        self.distance_raw
    }
}
