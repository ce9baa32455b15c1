use crate::config::CriterionOperator;

/// Unexpected failure while evaluating a config.
///
/// A rule that simply does not match is not an error. These errors are logged and swallowed at the
/// resolver boundary, so a single bad rule cannot break resolution of other keys.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationError {
    /// A property operator has no property name to read.
    #[error("criterion with operator {operator:?} is missing a property name")]
    MissingPropertyName {
        /// The offending operator.
        operator: CriterionOperator,
    },

    /// Weighted values are empty or all weights are zero.
    #[error("weighted values have no positive total weight")]
    InvalidWeights,

    /// A provided value could not be read or converted to the config's value type.
    #[error("provided value from {env_var} is unavailable or has the wrong type")]
    ProvidedValueUnavailable {
        /// The environment variable that was read.
        env_var: String,
    },

    /// Segment references nest deeper than allowed (likely a cycle).
    #[error("segment {segment} nests too deeply")]
    SegmentDepthExceeded {
        /// Key of the segment being evaluated.
        segment: String,
    },
}
