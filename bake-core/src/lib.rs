//! Smart timeline adjustment for bakes in progress.
//!
//! Sensor reading → [`factors_for`] → [`sensitivity_factor`] per step →
//! [`recalculate`] → [`generate`] recommendations. [`TimelineState`] and
//! [`reduce`] hold one bake and move it forward one event at a time.

pub mod config;
pub mod environment;
pub mod error;
pub mod recalc;
pub mod recommend;
pub mod session;
pub mod state;
pub mod step;

pub use config::EngineConfig;
pub use environment::{
    EnvironmentFactors, EnvironmentReading, EnvironmentSource, EnvironmentStatus, FixedSource,
    ReplaySource, factors_for,
};
pub use error::TimelineError;
pub use recalc::{RecalcOutcome, apply_manual_override, recalculate, resequence};
pub use recommend::{RecommendationKind, Severity, SmartRecommendation, generate, timing_checks};
pub use session::{BakeObserver, BakeSession, Completion, NoopObserver, TracingObserver};
pub use state::{TimelineEvent, TimelineState, reduce, try_reduce};
pub use step::{
    AdjustmentSource, BakePlan, Confidence, StepSeed, StepStatus, StepType, TimelineAdjustment,
    TimelineStep, sensitivity_factor, shift_minutes,
};

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::config::EngineConfig;
    use crate::environment::EnvironmentReading;
    use crate::state::TimelineState;
    use crate::step::{StepSeed, StepType, TimelineStep};

    pub fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
    }

    pub fn reading(t: f64, h: f64) -> EnvironmentReading {
        EnvironmentReading {
            temperature_c: t,
            humidity_pct: h,
            observed_at: at(8, 0),
        }
    }

    /// 30 + 240 + 20 + 120 + 45 minutes.
    pub fn country_loaf() -> Vec<StepSeed> {
        vec![
            StepSeed::new("autolyse", "Autolyse", StepType::Autolyse, 30),
            StepSeed::new("bulk-ferment", "Bulk ferment", StepType::BulkFerment, 240),
            StepSeed::new("pre-shape", "Pre-shape", StepType::PreShape, 20),
            StepSeed::new("final-proof", "Final proof", StepType::FinalProof, 120),
            StepSeed::new("bake", "Bake", StepType::Bake, 45),
        ]
    }

    /// Steps chained from 08:00 with the first one active.
    pub fn started_timeline(seeds: Vec<StepSeed>) -> Vec<TimelineStep> {
        TimelineState::begin(seeds, at(8, 0), EngineConfig::default()).steps
    }
}
