use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::TimelineError;

/// One day.
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Tunables for the timeline engine.
///
/// Loaded from a JSON profile; any field left out takes its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Apply automatic duration adjustments to the timeline.
    #[serde(default = "default_auto_adjust")]
    pub auto_adjust: bool,

    /// Minimum gap between two automatic recalculation passes.
    #[serde(default = "default_throttle_minutes")]
    pub throttle_minutes: u32,

    /// Minimum duration delta before an automatic adjustment is surfaced.
    #[serde(default = "default_materiality_minutes")]
    pub materiality_minutes: u32,

    /// `|factor - 1|` above which a duration recommendation is emitted.
    #[serde(default = "default_recommendation_factor_threshold")]
    pub recommendation_factor_threshold: f64,

    /// Gap between sensor polls; the CLI replays readings at this cadence.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How early before a fermentation step ends to suggest a readiness check.
    #[serde(default = "default_readiness_lead_minutes")]
    pub readiness_lead_minutes: u32,

    /// How long past its end an active step may run before action is required.
    #[serde(default = "default_overdue_grace_minutes")]
    pub overdue_grace_minutes: u32,
}

fn default_auto_adjust() -> bool {
    true
}

fn default_throttle_minutes() -> u32 {
    5
}

fn default_materiality_minutes() -> u32 {
    5
}

fn default_recommendation_factor_threshold() -> f64 {
    0.15
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_readiness_lead_minutes() -> u32 {
    15
}

fn default_overdue_grace_minutes() -> u32 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            auto_adjust: default_auto_adjust(),
            throttle_minutes: default_throttle_minutes(),
            materiality_minutes: default_materiality_minutes(),
            recommendation_factor_threshold: default_recommendation_factor_threshold(),
            poll_interval_secs: default_poll_interval_secs(),
            readiness_lead_minutes: default_readiness_lead_minutes(),
            overdue_grace_minutes: default_overdue_grace_minutes(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON profile.
    pub fn from_json_str(txt: &str) -> Result<Self, TimelineError> {
        let cfg: EngineConfig = serde_json::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_pretty(&self) -> Result<String, TimelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Gap between two sensor polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::seconds(self.poll_interval_secs.min(MAX_POLL_INTERVAL_SECS) as i64)
    }

    pub fn validate(&self) -> Result<(), TimelineError> {
        let t = self.recommendation_factor_threshold;
        if !t.is_finite() || t < 0.0 {
            return Err(TimelineError::InvalidConfig(format!(
                "recommendation_factor_threshold must be a non-negative number, got {t}"
            )));
        }
        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(TimelineError::InvalidConfig(format!(
                "poll_interval_secs must be between 1 and {MAX_POLL_INTERVAL_SECS}"
            )));
        }
        Ok(())
    }
}
