//! A running bake wired to its collaborators.
//!
//! Analytics and notification scheduling live outside this crate; they are
//! handed in as a [`BakeObserver`] instead of being reached through globals.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::environment::EnvironmentSource;
use crate::error::TimelineError;
use crate::recommend::SmartRecommendation;
use crate::state::{TimelineEvent, TimelineState, try_reduce};
use crate::step::{TimelineAdjustment, TimelineStep};

/// How a step was finished. The timeline treats both the same.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Done,
    Skipped,
}

/// Receives what changed after each accepted event.
pub trait BakeObserver {
    fn step_finished(&mut self, _step: &TimelineStep, _how: Completion) {}

    /// Steps whose duration, start, end or adjustment changed, with their
    /// new values. Downstream steps pushed along by an upstream change are
    /// included so alerts can be rescheduled.
    fn timeline_adjusted(&mut self, _steps: &[TimelineStep]) {}

    fn recommendations_updated(&mut self, _recs: &[SmartRecommendation]) {}
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl BakeObserver for NoopObserver {}

/// Logs every notification.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingObserver;

impl BakeObserver for TracingObserver {
    fn step_finished(&mut self, step: &TimelineStep, how: Completion) {
        info!(step = %step.id, ?how, "step finished");
    }

    fn timeline_adjusted(&mut self, steps: &[TimelineStep]) {
        for s in steps {
            match &s.adjustment {
                Some(TimelineAdjustment {
                    adjusted_duration,
                    reason,
                    ..
                }) => info!(step = %s.id, minutes = adjusted_duration, %reason, ends = %s.end_time, "adjusted"),
                None => info!(step = %s.id, minutes = s.adjusted_duration_minutes, ends = %s.end_time, "rescheduled"),
            }
        }
    }

    fn recommendations_updated(&mut self, recs: &[SmartRecommendation]) {
        info!(count = recs.len(), "recommendations updated");
    }
}

fn moved(new: &TimelineStep, old: &TimelineStep) -> bool {
    new.adjusted_duration_minutes != old.adjusted_duration_minutes
        || new.start_time != old.start_time
        || new.end_time != old.end_time
        || new.adjustment != old.adjustment
}

pub struct BakeSession<O: BakeObserver> {
    state: TimelineState,
    observer: O,
}

impl<O: BakeObserver> BakeSession<O> {
    pub fn new(state: TimelineState, observer: O) -> Self {
        BakeSession { state, observer }
    }

    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_state(self) -> TimelineState {
        self.state
    }

    /// Reduce one event and tell the observer what changed.
    ///
    /// A rejected event leaves the session untouched.
    pub fn dispatch(&mut self, event: TimelineEvent) -> Result<(), TimelineError> {
        let next = try_reduce(&self.state, &event)?;

        let finished = match &event {
            TimelineEvent::MarkDone { step_id, .. } => Some((step_id, Completion::Done)),
            TimelineEvent::Skip { step_id, .. } => Some((step_id, Completion::Skipped)),
            _ => None,
        };
        if let Some((id, how)) = finished {
            if let Some(step) = next.step(id) {
                self.observer.step_finished(step, how);
            }
        }

        let changed: Vec<TimelineStep> = next
            .steps
            .iter()
            .zip(&self.state.steps)
            .filter(|(new, old)| moved(new, old))
            .map(|(new, _)| new.clone())
            .collect();
        if !changed.is_empty() {
            self.observer.timeline_adjusted(&changed);
        }

        if next.recommendations != self.state.recommendations {
            self.observer.recommendations_updated(&next.recommendations);
        }

        self.state = next;
        Ok(())
    }

    /// Pull the latest reading from `source` and feed it in.
    pub fn poll<S: EnvironmentSource>(
        &mut self,
        source: &mut S,
        at: DateTime<Utc>,
    ) -> Result<(), TimelineError> {
        let reading = source.latest();
        self.dispatch(TimelineEvent::Reading { reading, at })
    }
}
