//! Hooks for watching predictions and belief writes without changing them.

use crate::belief::{Belief, FeatureKey};
use std::fmt;

/// Why a belief was written to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionCause {
    /// Written by `train` after prior regression.
    Training,
    /// Written directly through `set_belief`.
    Assignment,
}

impl TransitionCause {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Training => "training update",
            Self::Assignment => "direct assignment",
        }
    }
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Emitted once per `predict` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PredictionEvent {
    pub num_features: usize,
    pub total_mean: f64,
    pub total_variance: f64,
    pub probability: f64,
}

/// Emitted after every successful store mutation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeliefTransition {
    pub key: FeatureKey,
    pub cause: TransitionCause,
    pub before: Belief,
    /// The moment-matched posterior computed by `train`. It is reported here
    /// but is not what gets stored.
    pub moment_matched: Option<Belief>,
    pub after: Belief,
}

/// Observer for structured predictor events.
///
/// Callbacks take `&self` so a single observer can be shared by concurrent
/// readers; implementations needing state should use interior mutability.
pub trait PredictorObserver: Send + Sync {
    fn on_prediction(&self, event: &PredictionEvent) {
        let _ = event;
    }
    fn on_belief_transition(&self, transition: &BeliefTransition) {
        let _ = transition;
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct NoopObserver;

impl PredictorObserver for NoopObserver {}

/// Forwards every event to the `log` facade at debug level.
#[derive(Default, Debug, Clone, Copy)]
pub struct LoggingObserver;

impl PredictorObserver for LoggingObserver {
    fn on_prediction(&self, event: &PredictionEvent) {
        log::debug!(
            "Predicted p = {:.6} from {} features (total mean {:.6}, total variance {:.6})",
            event.probability,
            event.num_features,
            event.total_mean,
            event.total_variance
        );
    }

    fn on_belief_transition(&self, transition: &BeliefTransition) {
        match transition.moment_matched {
            Some(matched) => log::debug!(
                "Feature {} ({}): {} -> {} (moment-matched {})",
                transition.key,
                transition.cause,
                transition.before,
                transition.after,
                matched
            ),
            None => log::debug!(
                "Feature {} ({}): {} -> {}",
                transition.key,
                transition.cause,
                transition.before,
                transition.after
            ),
        }
    }
}
