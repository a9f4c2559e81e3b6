//! The in-progress bake as a value, and the reducer that moves it forward.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::environment::{EnvironmentFactors, EnvironmentReading, factors_for};
use crate::error::TimelineError;
use crate::recalc::{apply_adjustment, apply_manual_override, recalculate, resequence};
use crate::recommend::{RecommendationKind, SmartRecommendation, generate, timing_checks};
use crate::step::{StepSeed, StepStatus, TimelineStep};

/// Everything one bake owns while it is running.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    pub steps: Vec<TimelineStep>,
    pub factors: EnvironmentFactors,
    pub recommendations: Vec<SmartRecommendation>,
    pub config: EngineConfig,
    /// When the last throttled pass ran.
    pub last_auto_pass: Option<DateTime<Utc>>,
    /// Timing advisories the user dismissed; cleared on the next full pass.
    #[serde(default)]
    pub dismissed: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimelineEvent {
    /// New sensor poll; `None` when the sensor had nothing.
    Reading {
        reading: Option<EnvironmentReading>,
        at: DateTime<Utc>,
    },
    /// Run a pass now regardless of the throttle.
    Recalculate { at: DateTime<Utc> },
    MarkDone { step_id: String, at: DateTime<Utc> },
    Skip { step_id: String, at: DateTime<Utc> },
    OverrideDuration { step_id: String, minutes: u32 },
    SetAutoAdjust { enabled: bool },
    DismissRecommendation { id: String },
    ApplyRecommendation { id: String },
    Tick { at: DateTime<Utc> },
}

impl TimelineState {
    /// Seed a bake from recipe steps: first step active, times chained from
    /// `started_at`.
    pub fn begin(seeds: Vec<StepSeed>, started_at: DateTime<Utc>, config: EngineConfig) -> Self {
        let mut steps: Vec<TimelineStep> = seeds
            .into_iter()
            .map(|s| TimelineStep::from_seed(s, started_at))
            .collect();
        resequence(&mut steps);
        if let Some(first) = steps.first_mut() {
            first.status = StepStatus::Active;
        }
        info!(steps = steps.len(), %started_at, "bake started");
        TimelineState {
            steps,
            factors: EnvironmentFactors::NEUTRAL,
            recommendations: Vec::new(),
            config,
            last_auto_pass: None,
            dismissed: BTreeSet::new(),
        }
    }

    pub fn active_step(&self) -> Option<&TimelineStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Active)
    }

    pub fn step(&self, id: &str) -> Option<&TimelineStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// When the last step is expected to finish.
    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        self.steps.last().map(|s| s.end_time)
    }

    pub fn is_finished(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(TimelineStep::is_completed)
    }

    fn throttle_open(&self, at: DateTime<Utc>) -> bool {
        match self.last_auto_pass {
            None => true,
            Some(prev) => at - prev >= Duration::minutes(i64::from(self.config.throttle_minutes)),
        }
    }

    /// One atomic pass: apply factors (when automatic adjustment is on) and
    /// regenerate the environment and duration advisories.
    fn run_pass(&mut self, at: DateTime<Utc>) {
        if self.config.auto_adjust {
            let outcome = recalculate(&self.steps, &self.factors, &self.config);
            debug!(adjusted = outcome.adjustments.len(), "recalculation pass");
            self.steps = outcome.steps;
        }
        self.last_auto_pass = Some(at);
        self.dismissed.clear();
        self.refresh_recommendations();
    }

    /// With automatic adjustment off, advisories come from a preview pass so
    /// the user can choose to apply them.
    fn refresh_recommendations(&mut self) {
        let mut recs = if self.config.auto_adjust {
            generate(&self.factors, &self.steps, &self.config, true)
        } else {
            let preview = recalculate(&self.steps, &self.factors, &self.config);
            generate(&self.factors, &preview.steps, &self.config, false)
        };
        recs.extend(
            self.recommendations
                .iter()
                .filter(|r| is_timing(r))
                .cloned(),
        );
        self.recommendations = recs;
    }

    fn complete_step(&mut self, step_id: &str, at: DateTime<Utc>) -> Result<(), TimelineError> {
        let idx = self
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| TimelineError::UnknownStep(step_id.to_string()))?;
        if self.steps[idx].is_completed() {
            return Err(TimelineError::StepCompleted(step_id.to_string()));
        }

        self.steps[idx].status = StepStatus::Completed;
        self.steps[idx].completed_at = Some(at);

        // Only hand over when nothing else is running, so at most one step is
        // ever active.
        let still_active = self.steps.iter().any(|s| s.status == StepStatus::Active);
        if !still_active {
            if let Some(next) = self.steps.get_mut(idx + 1) {
                if next.status == StepStatus::Pending {
                    next.status = StepStatus::Active;
                }
            }
        }

        self.recommendations
            .retain(|r| r.step_id.as_deref() != Some(step_id));
        Ok(())
    }

    /// Put open steps back on their recipe durations, keeping manual ones.
    fn drop_automatic_adjustments(&mut self) {
        for step in self.steps.iter_mut().filter(|s| !s.is_completed()) {
            if step.adjustment.as_ref().is_some_and(|a| a.is_manual()) {
                continue;
            }
            step.adjusted_duration_minutes = step.original_duration_minutes;
            step.adjustment = None;
        }
        resequence(&mut self.steps);
    }
}

fn is_timing(rec: &SmartRecommendation) -> bool {
    matches!(
        rec.kind,
        RecommendationKind::ReadinessCheck | RecommendationKind::ActionRequired
    )
}

/// Apply one event, or explain why it cannot be applied.
pub fn try_reduce(
    state: &TimelineState,
    event: &TimelineEvent,
) -> Result<TimelineState, TimelineError> {
    let mut next = state.clone();
    match event {
        TimelineEvent::Reading { reading, at } => {
            next.factors = factors_for(reading.as_ref());
            if next.throttle_open(*at) {
                next.run_pass(*at);
            } else {
                debug!(%at, "recalculation throttled");
            }
        }
        TimelineEvent::Recalculate { at } => next.run_pass(*at),
        TimelineEvent::MarkDone { step_id, at } => {
            next.complete_step(step_id, *at)?;
            info!(step = %step_id, "step done");
        }
        TimelineEvent::Skip { step_id, at } => {
            next.complete_step(step_id, *at)?;
            info!(step = %step_id, "step skipped");
        }
        TimelineEvent::OverrideDuration { step_id, minutes } => {
            apply_manual_override(&mut next.steps, step_id, *minutes)?;
            info!(step = %step_id, minutes, "manual duration override");
            next.refresh_recommendations();
        }
        TimelineEvent::SetAutoAdjust { enabled } => {
            next.config.auto_adjust = *enabled;
            if *enabled {
                next.steps = recalculate(&next.steps, &next.factors, &next.config).steps;
            } else {
                next.drop_automatic_adjustments();
            }
            next.refresh_recommendations();
        }
        TimelineEvent::DismissRecommendation { id } => {
            let idx = next
                .recommendations
                .iter()
                .position(|r| &r.id == id)
                .ok_or_else(|| TimelineError::UnknownRecommendation(id.clone()))?;
            let rec = next.recommendations.remove(idx);
            if is_timing(&rec) {
                next.dismissed.insert(rec.id);
            }
        }
        TimelineEvent::ApplyRecommendation { id } => {
            let idx = next
                .recommendations
                .iter()
                .position(|r| &r.id == id)
                .ok_or_else(|| TimelineError::UnknownRecommendation(id.clone()))?;
            let rec = &next.recommendations[idx];
            let adj = match &rec.adjustment {
                Some(adj) if !rec.auto_applied && !adj.is_manual() => adj.clone(),
                _ => return Err(TimelineError::NotApplicable(id.clone())),
            };
            apply_adjustment(&mut next.steps, &adj)?;
            next.recommendations.remove(idx);
            info!(step = %adj.step_id, minutes = adj.adjusted_duration, "recommendation applied");
        }
        TimelineEvent::Tick { at } => {
            next.recommendations.retain(|r| !is_timing(r));
            let dismissed = &next.dismissed;
            let fresh: Vec<_> = timing_checks(&next.steps, *at, &next.config)
                .into_iter()
                .filter(|r| !dismissed.contains(&r.id))
                .collect();
            next.recommendations.extend(fresh);
        }
    }
    Ok(next)
}

/// Total reducer: a rejected event leaves the state as it was.
pub fn reduce(state: TimelineState, event: &TimelineEvent) -> TimelineState {
    match try_reduce(&state, event) {
        Ok(next) => next,
        Err(e) => {
            warn!(error = %e, "event ignored");
            state
        }
    }
}
