#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod belief;
pub mod config;
pub mod data;
pub mod model;
pub mod normal;
pub mod numeric;
pub mod observer;

pub use belief::{Belief, BeliefStore, FeatureKey};
pub use config::PredictorConfig;
pub use model::{AdPredictor, PredictorError};
