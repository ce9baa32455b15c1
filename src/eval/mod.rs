//! Rule evaluation: criteria matching, weighted selection, and provided values.
mod criteria;
mod error;
mod evaluator;
mod weighted;

pub use error::EvaluationError;
pub(crate) use evaluator::Evaluator;
pub use evaluator::{EnvLookup, Match, SystemEnvLookup};
