use thiserror::Error;

/// Errors raised by user actions against a timeline and by config parsing.
///
/// The engine passes themselves (factors, recalculation, recommendations)
/// never fail; only caller-supplied ids, durations and profiles can.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("no step with id `{0}` in this timeline")]
    UnknownStep(String),

    #[error("step `{0}` is already completed")]
    StepCompleted(String),

    #[error("invalid duration for step `{step_id}`: {minutes} min")]
    InvalidDuration { step_id: String, minutes: u32 },

    #[error("no recommendation with id `{0}`")]
    UnknownRecommendation(String),

    #[error("recommendation `{0}` has nothing to apply")]
    NotApplicable(String),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
