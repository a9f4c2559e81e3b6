//! Advisories derived from the current environment and timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::environment::{EnvironmentFactors, EnvironmentStatus};
use crate::step::{
    Confidence, StepStatus, StepType, TimelineAdjustment, TimelineStep, shift_minutes,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    DurationAdjustment,
    EnvironmentWarning,
    ReadinessCheck,
    ActionRequired,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmartRecommendation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub auto_applied: bool,
    /// Proposed change, kept so it can be applied later on request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<TimelineAdjustment>,
}

pub const ENVIRONMENT_WARNING_ID: &str = "env-warning";

/// Recommendations for the current factors and step list.
///
/// `auto_applied` tells the reader whether the durations are already on the
/// timeline or only proposed.
pub fn generate(
    factors: &EnvironmentFactors,
    steps: &[TimelineStep],
    config: &EngineConfig,
    auto_applied: bool,
) -> Vec<SmartRecommendation> {
    let mut recs = Vec::new();

    if factors.status == EnvironmentStatus::Poor {
        recs.push(environment_warning(factors));
    }

    // Finished steps have nothing left to adjust.
    for step in steps.iter().filter(|s| !s.is_completed()) {
        let Some(adj) = &step.adjustment else {
            continue;
        };
        if (adj.factor - 1.0).abs() <= config.recommendation_factor_threshold {
            continue;
        }
        let severity = if adj.confidence == Confidence::Low {
            Severity::Warning
        } else {
            Severity::Info
        };
        let delta = adj.delta_minutes();
        let direction = if delta >= 0 { "extended" } else { "shortened" };
        recs.push(SmartRecommendation {
            id: format!("duration-{}", step.id),
            kind: RecommendationKind::DurationAdjustment,
            severity,
            title: format!("{} {} by {} min", step.name, direction, delta.abs()),
            description: format!(
                "{} ({} → {} min, {} confidence)",
                adj.reason,
                adj.original_duration,
                adj.adjusted_duration,
                adj.confidence.as_str()
            ),
            action_label: (!auto_applied && !adj.is_manual())
                .then(|| "Apply adjustment".to_string()),
            step_id: Some(step.id.clone()),
            auto_applied,
            adjustment: Some(adj.clone()),
        });
    }

    recs
}

fn environment_warning(factors: &EnvironmentFactors) -> SmartRecommendation {
    let pace = if factors.combined_factor > 1.0 {
        "slower"
    } else {
        "faster"
    };
    let fix = if factors.combined_factor > 1.0 {
        "Move the dough somewhere warmer or cover it to hold moisture."
    } else {
        "Move the dough somewhere cooler and watch it closely."
    };
    let now = match &factors.reading {
        Some(r) => format!(
            "Currently {:.1}°C at {:.0}% humidity. ",
            r.temperature_c, r.humidity_pct
        ),
        None => String::new(),
    };
    SmartRecommendation {
        id: ENVIRONMENT_WARNING_ID.to_string(),
        kind: RecommendationKind::EnvironmentWarning,
        severity: Severity::Warning,
        title: "Conditions are far from ideal".to_string(),
        description: format!(
            "{now}Fermentation will run much {pace} than the recipe expects (×{:.2}). {fix}",
            factors.combined_factor
        ),
        action_label: None,
        step_id: None,
        auto_applied: false,
        adjustment: None,
    }
}

/// Time-based nudges for the active fermentation step.
pub fn timing_checks(
    steps: &[TimelineStep],
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Vec<SmartRecommendation> {
    let Some(step) = steps
        .iter()
        .find(|s| s.status == StepStatus::Active && s.is_environment_sensitive)
    else {
        return Vec::new();
    };

    let overdue_at = shift_minutes(step.end_time, i64::from(config.overdue_grace_minutes));
    let check_at = shift_minutes(step.end_time, -i64::from(config.readiness_lead_minutes));

    let rec = if now > overdue_at {
        let late = (now - step.end_time).num_minutes();
        SmartRecommendation {
            id: format!("overdue-{}", step.id),
            kind: RecommendationKind::ActionRequired,
            severity: Severity::Critical,
            title: format!("{} is running {} min long", step.name, late),
            description: "The dough may be over-fermenting. Check it now and move on if it is ready."
                .to_string(),
            action_label: Some("Mark done".to_string()),
            step_id: Some(step.id.clone()),
            auto_applied: false,
            adjustment: None,
        }
    } else if now >= check_at {
        SmartRecommendation {
            id: format!("readiness-{}", step.id),
            kind: RecommendationKind::ReadinessCheck,
            severity: Severity::Info,
            title: format!("Check if {} is ready", step.name),
            description: readiness_hint(step.step_type).to_string(),
            action_label: Some("Mark done".to_string()),
            step_id: Some(step.id.clone()),
            auto_applied: false,
            adjustment: None,
        }
    } else {
        return Vec::new();
    };
    vec![rec]
}

fn readiness_hint(step_type: StepType) -> &'static str {
    match step_type {
        StepType::BulkFerment => {
            "Look for a 50-75% rise, a domed surface and bubbles along the sides."
        }
        StepType::FinalProof => {
            "Poke test: the dent should spring back slowly and not completely."
        }
        StepType::PreShape => "The rounds should have relaxed and spread slightly.",
        _ => "Check the dough before moving to the next step.",
    }
}
