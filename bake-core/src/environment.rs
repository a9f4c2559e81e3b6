//! Ambient conditions and the fermentation-speed factors derived from them.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dough temperature at which fermentation runs at baseline speed (°C).
pub const OPTIMAL_TEMPERATURE_C: f64 = 25.5;
/// Relative humidity at which the dough surface behaves as baseline (%).
pub const OPTIMAL_HUMIDITY_PCT: f64 = 67.5;

/// One sensor sample.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    Optimal,
    Suboptimal,
    Poor,
    Unknown,
}

impl EnvironmentStatus {
    /// Classify a combined factor. Never returns `Unknown`.
    pub fn from_combined(combined: f64) -> Self {
        if !(0.8..=1.3).contains(&combined) {
            EnvironmentStatus::Poor
        } else if !(0.9..=1.2).contains(&combined) {
            EnvironmentStatus::Suboptimal
        } else {
            EnvironmentStatus::Optimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentStatus::Optimal => "optimal",
            EnvironmentStatus::Suboptimal => "suboptimal",
            EnvironmentStatus::Poor => "poor",
            EnvironmentStatus::Unknown => "unknown",
        }
    }
}

/// Multipliers applied to fermentation-sensitive durations.
///
/// A factor above 1.0 means the dough needs more time than the recipe says.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentFactors {
    pub temperature_factor: f64,
    pub humidity_factor: f64,
    /// Always `temperature_factor * humidity_factor`.
    pub combined_factor: f64,
    pub status: EnvironmentStatus,
    /// The reading these factors were computed from.
    pub reading: Option<EnvironmentReading>,
}

impl EnvironmentFactors {
    /// What the engine assumes when no sensor reading is available.
    pub const NEUTRAL: EnvironmentFactors = EnvironmentFactors {
        temperature_factor: 1.0,
        humidity_factor: 1.0,
        combined_factor: 1.0,
        status: EnvironmentStatus::Unknown,
        reading: None,
    };
}

impl Default for EnvironmentFactors {
    fn default() -> Self {
        EnvironmentFactors::NEUTRAL
    }
}

/// Cooler dough ferments slower (factor > 1), warmer dough faster.
pub fn temperature_factor(temperature_c: f64) -> f64 {
    let below = temperature_c < OPTIMAL_TEMPERATURE_C;
    let dev = (temperature_c - OPTIMAL_TEMPERATURE_C).abs();
    if dev <= 1.5 {
        1.0
    } else if dev <= 3.0 {
        if below { 1.2 } else { 0.85 }
    } else if dev <= 5.0 {
        if below { 1.4 } else { 0.75 }
    } else if below {
        1.6
    } else {
        0.6
    }
}

/// Dry air skins the dough and slows it down; humid air speeds it slightly.
pub fn humidity_factor(humidity_pct: f64) -> f64 {
    let low = humidity_pct < OPTIMAL_HUMIDITY_PCT;
    let dev = (humidity_pct - OPTIMAL_HUMIDITY_PCT).abs();
    if dev <= 7.5 {
        1.0
    } else if dev <= 15.0 {
        if low { 1.1 } else { 0.95 }
    } else if low {
        1.2
    } else {
        0.9
    }
}

/// Derive factors from the latest reading. `None` yields [`EnvironmentFactors::NEUTRAL`].
pub fn factors_for(reading: Option<&EnvironmentReading>) -> EnvironmentFactors {
    let Some(r) = reading else {
        return EnvironmentFactors::NEUTRAL;
    };
    let tf = temperature_factor(r.temperature_c);
    let hf = humidity_factor(r.humidity_pct);
    let combined = tf * hf;
    EnvironmentFactors {
        temperature_factor: tf,
        humidity_factor: hf,
        combined_factor: combined,
        status: EnvironmentStatus::from_combined(combined),
        reading: Some(*r),
    }
}

/// Anything that can hand the engine its most recent sensor sample.
pub trait EnvironmentSource {
    /// `None` when the sensor is unset or failed.
    fn latest(&mut self) -> Option<EnvironmentReading>;
}

/// A source that always reports the same reading (or none).
#[derive(Copy, Clone, Debug, Default)]
pub struct FixedSource(pub Option<EnvironmentReading>);

impl EnvironmentSource for FixedSource {
    fn latest(&mut self) -> Option<EnvironmentReading> {
        self.0
    }
}

/// Plays back recorded readings one per poll, then keeps repeating the last
/// one. An empty recording behaves like a missing sensor.
#[derive(Clone, Debug, Default)]
pub struct ReplaySource {
    queue: VecDeque<EnvironmentReading>,
    last: Option<EnvironmentReading>,
}

impl ReplaySource {
    pub fn new(readings: impl IntoIterator<Item = EnvironmentReading>) -> Self {
        ReplaySource {
            queue: readings.into_iter().collect(),
            last: None,
        }
    }

    /// Readings not yet handed out.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl EnvironmentSource for ReplaySource {
    fn latest(&mut self) -> Option<EnvironmentReading> {
        if let Some(r) = self.queue.pop_front() {
            self.last = Some(r);
        }
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn reading(t: f64, h: f64) -> EnvironmentReading {
        EnvironmentReading {
            temperature_c: t,
            humidity_pct: h,
            observed_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn near_optimal_is_neutral() {
        let f = factors_for(Some(&reading(24.0, 65.0)));
        assert_relative_eq!(f.combined_factor, 1.0, epsilon = 1e-9);
        assert_eq!(f.status, EnvironmentStatus::Optimal);
    }

    #[test]
    fn cool_and_dry_slows_down() {
        let f = factors_for(Some(&reading(21.0, 55.0)));
        assert_relative_eq!(f.temperature_factor, 1.4, epsilon = 1e-9);
        assert_relative_eq!(f.humidity_factor, 1.1, epsilon = 1e-9);
        assert_relative_eq!(f.combined_factor, 1.54, epsilon = 1e-9);
        assert_eq!(f.status, EnvironmentStatus::Poor);
    }

    #[test]
    fn cold_and_very_dry_hits_outer_bands() {
        let f = factors_for(Some(&reading(18.0, 40.0)));
        assert_relative_eq!(f.temperature_factor, 1.6, epsilon = 1e-9);
        assert_relative_eq!(f.humidity_factor, 1.2, epsilon = 1e-9);
        assert_eq!(f.status, EnvironmentStatus::Poor);
    }

    #[test]
    fn warm_and_humid_speeds_up() {
        assert_relative_eq!(temperature_factor(28.0), 0.85, epsilon = 1e-9);
        assert_relative_eq!(temperature_factor(30.0), 0.75, epsilon = 1e-9);
        assert_relative_eq!(temperature_factor(35.0), 0.6, epsilon = 1e-9);
        assert_relative_eq!(humidity_factor(80.0), 0.95, epsilon = 1e-9);
        assert_relative_eq!(humidity_factor(95.0), 0.9, epsilon = 1e-9);
    }

    #[test]
    fn missing_reading_is_unknown() {
        let f = factors_for(None);
        assert_eq!(f, EnvironmentFactors::NEUTRAL);
        assert_eq!(f.status, EnvironmentStatus::Unknown);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(EnvironmentStatus::from_combined(0.79), EnvironmentStatus::Poor);
        assert_eq!(EnvironmentStatus::from_combined(1.31), EnvironmentStatus::Poor);
        assert_eq!(EnvironmentStatus::from_combined(0.85), EnvironmentStatus::Suboptimal);
        assert_eq!(EnvironmentStatus::from_combined(1.25), EnvironmentStatus::Suboptimal);
        assert_eq!(EnvironmentStatus::from_combined(1.0), EnvironmentStatus::Optimal);
    }

    #[test]
    fn factors_total_over_domain() {
        let mut t = -20.0;
        while t <= 60.0 {
            let mut h = 0.0;
            while h <= 100.0 {
                let f = factors_for(Some(&reading(t, h)));
                assert!(f.temperature_factor.is_finite() && f.temperature_factor > 0.0);
                assert!(f.humidity_factor.is_finite() && f.humidity_factor > 0.0);
                assert_relative_eq!(
                    f.combined_factor,
                    f.temperature_factor * f.humidity_factor,
                    epsilon = 1e-12
                );
                assert_ne!(f.status, EnvironmentStatus::Unknown);
                h += 2.5;
            }
            t += 0.5;
        }
    }

    #[test]
    fn replay_repeats_last_reading_once_drained() {
        let mut src = ReplaySource::new([reading(21.0, 55.0), reading(24.0, 65.0)]);
        assert_eq!(src.remaining(), 2);
        assert_eq!(src.latest().map(|r| r.temperature_c), Some(21.0));
        assert_eq!(src.latest().map(|r| r.temperature_c), Some(24.0));
        assert_eq!(src.remaining(), 0);
        assert_eq!(src.latest().map(|r| r.temperature_c), Some(24.0));

        assert!(ReplaySource::new([]).latest().is_none());
    }
}
