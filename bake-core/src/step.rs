//! Timeline steps, their adjustments, and how strongly each stage responds
//! to the environment.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stage of a bake.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Autolyse,
    BulkFerment,
    PreShape,
    FinalProof,
    Bake,
    #[serde(other)]
    Other,
}

impl StepType {
    /// Autolyse is short and enzymatic, baking is oven-controlled; everything
    /// else tracks ambient fermentation speed.
    pub fn is_environment_sensitive(&self) -> bool {
        !matches!(self, StepType::Autolyse | StepType::Bake)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Autolyse => "autolyse",
            StepType::BulkFerment => "bulk_ferment",
            StepType::PreShape => "pre_shape",
            StepType::FinalProof => "final_proof",
            StepType::Bake => "bake",
            StepType::Other => "other",
        }
    }
}

impl FromStr for StepType {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to [`StepType::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "autolyse" => StepType::Autolyse,
            "bulk_ferment" => StepType::BulkFerment,
            "pre_shape" => StepType::PreShape,
            "final_proof" => StepType::FinalProof,
            "bake" => StepType::Bake,
            _ => StepType::Other,
        };
        Ok(t)
    }
}

/// Effective multiplier for a step given the combined environment factor.
pub fn sensitivity_factor(step_type: StepType, combined: f64) -> f64 {
    match step_type {
        StepType::Autolyse | StepType::Bake => 1.0,
        StepType::BulkFerment | StepType::FinalProof => combined,
        StepType::PreShape => 1.0 + (combined - 1.0) * 0.3,
        StepType::Other => 1.0 + (combined - 1.0) * 0.5,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Active => "active",
            StepStatus::Completed => "completed",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// The further a factor strays from neutral, the less we trust it.
    pub fn from_factor(factor: f64) -> Self {
        let dev = (factor - 1.0).abs();
        if dev < 0.1 {
            Confidence::High
        } else if dev < 0.2 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Who changed the duration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSource {
    Automatic,
    Manual,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineAdjustment {
    pub step_id: String,
    pub original_duration: u32,
    pub adjusted_duration: u32,
    pub reason: String,
    pub confidence: Confidence,
    pub factor: f64,
    pub source: AdjustmentSource,
}

impl TimelineAdjustment {
    pub fn is_manual(&self) -> bool {
        self.source == AdjustmentSource::Manual
    }

    /// Signed change in minutes.
    pub fn delta_minutes(&self) -> i64 {
        i64::from(self.adjusted_duration) - i64::from(self.original_duration)
    }
}

/// `t` moved by `minutes`, clamped to the representable range instead of
/// overflowing on absurd plan durations.
pub fn shift_minutes(t: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    t.checked_add_signed(Duration::minutes(minutes))
        .unwrap_or(if minutes < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

/// What the recipe side hands over when a bake starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSeed {
    pub id: String,
    pub name: String,
    pub step_type: StepType,
    pub duration_minutes: u32,
}

impl StepSeed {
    pub fn new(id: &str, name: &str, step_type: StepType, duration_minutes: u32) -> Self {
        StepSeed {
            id: id.to_string(),
            name: name.to_string(),
            step_type,
            duration_minutes,
        }
    }
}

/// A recipe's ordered steps as stored by the persistence side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BakePlan {
    pub name: String,
    pub steps: Vec<StepSeed>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub id: String,
    pub name: String,
    pub step_type: StepType,
    /// Baseline from the recipe; never changes.
    pub original_duration_minutes: u32,
    pub adjusted_duration_minutes: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: StepStatus,
    pub is_environment_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<TimelineAdjustment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TimelineStep {
    /// A pending step starting at `start_time` with its recipe duration.
    pub fn from_seed(seed: StepSeed, start_time: DateTime<Utc>) -> Self {
        let duration = seed.duration_minutes;
        TimelineStep {
            is_environment_sensitive: seed.step_type.is_environment_sensitive(),
            id: seed.id,
            name: seed.name,
            step_type: seed.step_type,
            original_duration_minutes: duration,
            adjusted_duration_minutes: duration,
            start_time,
            end_time: shift_minutes(start_time, i64::from(duration)),
            status: StepStatus::Pending,
            adjustment: None,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Place the step at `start`, keeping `end_time = start + adjusted`.
    pub fn schedule_at(&mut self, start: DateTime<Utc>) {
        self.start_time = start;
        self.end_time = shift_minutes(start, i64::from(self.adjusted_duration_minutes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    #[test]
    fn sensitivity_by_type() {
        let c = 1.5;
        assert_relative_eq!(sensitivity_factor(StepType::Autolyse, c), 1.0);
        assert_relative_eq!(sensitivity_factor(StepType::Bake, c), 1.0);
        assert_relative_eq!(sensitivity_factor(StepType::BulkFerment, c), 1.5);
        assert_relative_eq!(sensitivity_factor(StepType::FinalProof, c), 1.5);
        assert_relative_eq!(sensitivity_factor(StepType::PreShape, c), 1.15, epsilon = 1e-9);
        assert_relative_eq!(sensitivity_factor(StepType::Other, c), 1.25, epsilon = 1e-9);
    }

    #[test]
    fn only_autolyse_and_bake_are_insensitive() {
        assert!(!StepType::Autolyse.is_environment_sensitive());
        assert!(!StepType::Bake.is_environment_sensitive());
        assert!(StepType::BulkFerment.is_environment_sensitive());
        assert!(StepType::PreShape.is_environment_sensitive());
        assert!(StepType::FinalProof.is_environment_sensitive());
        assert!(StepType::Other.is_environment_sensitive());
    }

    #[test]
    fn unknown_type_falls_back_to_other() {
        assert_eq!("lamination".parse::<StepType>().unwrap(), StepType::Other);
        assert_eq!("bulk-ferment".parse::<StepType>().unwrap(), StepType::BulkFerment);
        let t: StepType = serde_json::from_str("\"coil_fold\"").unwrap();
        assert_eq!(t, StepType::Other);
        let t: StepType = serde_json::from_str("\"final_proof\"").unwrap();
        assert_eq!(t, StepType::FinalProof);
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(Confidence::from_factor(1.05), Confidence::High);
        assert_eq!(Confidence::from_factor(0.85), Confidence::Medium);
        assert_eq!(Confidence::from_factor(1.54), Confidence::Low);
    }

    #[test]
    fn huge_durations_saturate_instead_of_panicking() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let mut prev = start;
        for i in 0..40 {
            let mut step = TimelineStep::from_seed(
                StepSeed::new(&format!("s{i}"), "Long", StepType::Other, u32::MAX),
                prev,
            );
            step.schedule_at(prev);
            assert!(step.end_time >= step.start_time);
            prev = step.end_time;
        }
        assert_eq!(prev, DateTime::<Utc>::MAX_UTC);
        assert_eq!(shift_minutes(start, -i64::from(u32::MAX) * 1000), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn seed_sets_end_from_duration() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let step = TimelineStep::from_seed(
            StepSeed::new("bulk", "Bulk", StepType::BulkFerment, 240),
            start,
        );
        assert_eq!(step.end_time - step.start_time, Duration::minutes(240));
        assert!(step.is_environment_sensitive);
        assert_eq!(step.status, StepStatus::Pending);
    }
}
