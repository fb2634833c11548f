//! Sensor collaborator and sampling window
//!
//! Members read their sensors on a timer, average a short window and
//! report the averages master-ward. A sudden change in both distance and
//! light is reported at once instead of waiting for the window.

use heapless::Vec;

// ============================================================================
// Configuration
// ============================================================================

/// Samples averaged per report
pub const SENSOR_WINDOW: usize = 3;

/// Distance change (cm) that counts as an event
pub const DISTANCE_THRESHOLD_CM: i32 = 20;

/// Light change (lux) that counts as an event
pub const LIGHT_THRESHOLD_LUX: i32 = 500;

/// Full-scale ADC count (12 bit)
pub const ADC_MAX: i32 = 4095;

/// Illuminance at full-scale ADC count
pub const LIGHT_FULL_SCALE_LUX: i32 = 3000;

/// IR ranger curve: (ADC count, cm), counts descending
const DISTANCE_CURVE: [(i32, i32); 8] = [
    (3250, 10),
    (2050, 20),
    (1400, 30),
    (1100, 40),
    (900, 50),
    (750, 60),
    (650, 70),
    (560, 80),
];

// ============================================================================
// Collaborator
// ============================================================================

/// Sensor hardware of a node
pub trait Sensors {
    /// Battery voltage (mV)
    fn battery_millivolts(&mut self) -> i32;

    /// Temperature (degrees C)
    fn temperature(&mut self) -> i32;

    /// Light sensor ADC count
    fn light_raw(&mut self) -> i32;

    /// Distance sensor ADC count
    fn distance_raw(&mut self) -> i32;
}

/// Light ADC count to lux, linear
pub fn light_lux(raw: i32) -> i32 {
    raw.clamp(0, ADC_MAX) * LIGHT_FULL_SCALE_LUX / ADC_MAX
}

/// Distance ADC count to cm, piecewise linear over the ranger curve
pub fn distance_cm(raw: i32) -> i32 {
    let (near_raw, near_cm) = DISTANCE_CURVE[0];
    let (far_raw, far_cm) = DISTANCE_CURVE[DISTANCE_CURVE.len() - 1];
    if raw >= near_raw {
        return near_cm;
    }
    if raw <= far_raw {
        return far_cm;
    }
    for pair in DISTANCE_CURVE.windows(2) {
        let (hi_raw, hi_cm) = pair[0];
        let (lo_raw, lo_cm) = pair[1];
        if raw <= hi_raw && raw >= lo_raw {
            return hi_cm + (hi_raw - raw) * (lo_cm - hi_cm) / (hi_raw - lo_raw);
        }
    }
    far_cm
}

/// One converted sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorReading {
    /// Battery voltage (mV)
    pub battery_mv: i32,
    /// Temperature (degrees C)
    pub temperature: i32,
    /// Illuminance (lux)
    pub light_lux: i32,
    /// Distance (cm)
    pub distance_cm: i32,
}

impl SensorReading {
    /// Read every sensor once and convert
    pub fn sample<S: Sensors + ?Sized>(sensors: &mut S) -> Self {
        Self {
            battery_mv: sensors.battery_millivolts(),
            temperature: sensors.temperature(),
            light_lux: light_lux(sensors.light_raw()),
            distance_cm: distance_cm(sensors.distance_raw()),
        }
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Averaging window with event detection
#[derive(Debug, Clone, Default)]
pub struct SensorSampler {
    window: Vec<SensorReading, SENSOR_WINDOW>,
    last_reported: Option<SensorReading>,
}

impl SensorSampler {
    /// Empty sampler
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample; returns the reading to report, if any
    pub fn push(&mut self, reading: SensorReading) -> Option<SensorReading> {
        if let Some(last) = self.last_reported {
            let moved = (reading.distance_cm - last.distance_cm).abs() > DISTANCE_THRESHOLD_CM;
            let lit = (reading.light_lux - last.light_lux).abs() > LIGHT_THRESHOLD_LUX;
            if moved && lit {
                self.window.clear();
                self.last_reported = Some(reading);
                return Some(reading);
            }
        }

        if self.window.push(reading).is_err() {
            self.window.clear();
        }
        if !self.window.is_full() {
            return None;
        }
        let avg = self.average();
        self.window.clear();
        self.last_reported = Some(avg);
        Some(avg)
    }

    /// Samples currently buffered
    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    fn average(&self) -> SensorReading {
        let n = self.window.len().max(1) as i32;
        let sum = |f: fn(&SensorReading) -> i32| -> i32 {
            self.window.iter().map(f).sum::<i32>() / n
        };
        SensorReading {
            battery_mv: self.window.last().map_or(0, |r| r.battery_mv),
            temperature: sum(|r| r.temperature),
            light_lux: sum(|r| r.light_lux),
            distance_cm: sum(|r| r.distance_cm),
        }
    }
}
