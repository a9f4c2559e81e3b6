//! Recalculation passes: scale environment-sensitive durations and re-chain
//! the timeline.

use tracing::debug;

use crate::config::EngineConfig;
use crate::environment::{EnvironmentFactors, OPTIMAL_HUMIDITY_PCT, OPTIMAL_TEMPERATURE_C};
use crate::error::TimelineError;
use crate::step::{
    AdjustmentSource, Confidence, TimelineAdjustment, TimelineStep, sensitivity_factor,
};

pub const MANUAL_REASON: &str = "Manual adjustment";

/// Result of one recalculation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecalcOutcome {
    pub steps: Vec<TimelineStep>,
    /// Automatic adjustments attached during this pass.
    pub adjustments: Vec<TimelineAdjustment>,
}

/// Apply `factors` to every open, environment-sensitive step and re-chain
/// start/end times.
///
/// Durations are always derived from the recipe baseline, so running the
/// pass twice with the same factors gives the same list. Steps pinned by a
/// manual override are left alone.
pub fn recalculate(
    steps: &[TimelineStep],
    factors: &EnvironmentFactors,
    config: &EngineConfig,
) -> RecalcOutcome {
    let mut out = steps.to_vec();
    let mut adjustments = Vec::new();

    for step in out.iter_mut() {
        if step.is_completed() || !step.is_environment_sensitive {
            continue;
        }
        if step.adjustment.as_ref().is_some_and(|a| a.is_manual()) {
            continue;
        }

        let factor = sensitivity_factor(step.step_type, factors.combined_factor);
        let original = step.original_duration_minutes;
        let adjusted = (f64::from(original) * factor).round().max(0.0) as u32;
        step.adjusted_duration_minutes = adjusted;

        if adjusted.abs_diff(original) >= config.materiality_minutes {
            let adj = TimelineAdjustment {
                step_id: step.id.clone(),
                original_duration: original,
                adjusted_duration: adjusted,
                reason: adjustment_reason(factor, factors),
                confidence: Confidence::from_factor(factor),
                factor,
                source: AdjustmentSource::Automatic,
            };
            debug!(step = %step.id, original, adjusted, factor, "duration adjusted");
            adjustments.push(adj.clone());
            step.adjustment = Some(adj);
        } else {
            step.adjustment = None;
        }
    }

    resequence(&mut out);
    RecalcOutcome {
        steps: out,
        adjustments,
    }
}

/// Chain start/end times from the first step's start.
///
/// Completed steps keep their recorded times and move the clock to their end;
/// every other step starts where the previous one ended.
pub fn resequence(steps: &mut [TimelineStep]) {
    let Some(first) = steps.first() else {
        return;
    };
    let mut clock = first.start_time;
    for step in steps.iter_mut() {
        if !step.is_completed() {
            step.schedule_at(clock);
        }
        clock = step.end_time;
    }
}

/// Explain an automatic adjustment in terms of whichever of temperature or
/// humidity strays further from neutral.
pub fn adjustment_reason(factor: f64, factors: &EnvironmentFactors) -> String {
    let verb = if factor > 1.1 {
        "Extended"
    } else if factor < 0.9 {
        "Shortened"
    } else {
        return "Adjusted for current conditions".to_string();
    };

    let Some(r) = factors.reading else {
        return format!("{verb} for ambient conditions");
    };

    let temp_dev = (factors.temperature_factor - 1.0).abs();
    let hum_dev = (factors.humidity_factor - 1.0).abs();
    let cause = if temp_dev >= hum_dev {
        if r.temperature_c < OPTIMAL_TEMPERATURE_C {
            format!("cool temperature ({:.1}°C) slows fermentation", r.temperature_c)
        } else {
            format!("warm temperature ({:.1}°C) speeds up fermentation", r.temperature_c)
        }
    } else if r.humidity_pct < OPTIMAL_HUMIDITY_PCT {
        format!("low humidity ({:.0}%) slows the dough", r.humidity_pct)
    } else {
        format!("high humidity ({:.0}%) speeds up the dough", r.humidity_pct)
    };
    format!("{verb}: {cause}")
}

fn open_step_index(steps: &[TimelineStep], step_id: &str) -> Result<usize, TimelineError> {
    let idx = steps
        .iter()
        .position(|s| s.id == step_id)
        .ok_or_else(|| TimelineError::UnknownStep(step_id.to_string()))?;
    if steps[idx].is_completed() {
        return Err(TimelineError::StepCompleted(step_id.to_string()));
    }
    Ok(idx)
}

/// Set one step's duration by hand and push every later step along.
///
/// The manual adjustment is always recorded, even when `minutes` equals the
/// recipe duration, so automatic passes keep their hands off the step.
pub fn apply_manual_override(
    steps: &mut [TimelineStep],
    step_id: &str,
    minutes: u32,
) -> Result<TimelineAdjustment, TimelineError> {
    let idx = open_step_index(steps, step_id)?;
    if minutes == 0 {
        return Err(TimelineError::InvalidDuration {
            step_id: step_id.to_string(),
            minutes,
        });
    }

    let step = &mut steps[idx];
    let original = step.original_duration_minutes;
    let factor = if original == 0 {
        1.0
    } else {
        f64::from(minutes) / f64::from(original)
    };
    let adj = TimelineAdjustment {
        step_id: step.id.clone(),
        original_duration: original,
        adjusted_duration: minutes,
        reason: MANUAL_REASON.to_string(),
        confidence: Confidence::High,
        factor,
        source: AdjustmentSource::Manual,
    };
    step.adjusted_duration_minutes = minutes;
    step.adjustment = Some(adj.clone());

    resequence(steps);
    Ok(adj)
}

/// Put a proposed adjustment the baker accepted onto its step.
///
/// Once accepted it is pinned like a manual override, so later automatic
/// passes leave it alone.
pub fn apply_adjustment(
    steps: &mut [TimelineStep],
    adjustment: &TimelineAdjustment,
) -> Result<(), TimelineError> {
    let idx = open_step_index(steps, &adjustment.step_id)?;
    let step = &mut steps[idx];
    step.adjusted_duration_minutes = adjustment.adjusted_duration;
    step.adjustment = Some(TimelineAdjustment {
        source: AdjustmentSource::Manual,
        ..adjustment.clone()
    });
    resequence(steps);
    Ok(())
}
