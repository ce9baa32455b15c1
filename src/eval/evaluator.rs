use crate::{
    config::{
        ConditionalValue, Config, ConfigElement, Criterion, CriterionOperator, Provenance,
        ValueSource,
    },
    ConfigValue, EvaluationError, LookupContext, MergedConfigData,
};

const MAX_SEGMENT_DEPTH: usize = 8;

/// Source of provided (environment) values.
///
/// Implemented for any `Fn(&str) -> Option<String>`, which is handy in tests.
pub trait EnvLookup: Send + Sync {
    /// Return the value of the variable, if set.
    fn get_var(&self, name: &str) -> Option<String>;
}

/// Reads variables from the process environment.
pub struct SystemEnvLookup;

impl EnvLookup for SystemEnvLookup {
    fn get_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<T: Fn(&str) -> Option<String> + Send + Sync> EnvLookup for T {
    fn get_var(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Result of a successful evaluation, with enough detail to explain where the value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Key of the evaluated config.
    pub config_key: String,
    /// Id (version) of the evaluated config.
    pub config_id: i64,
    /// The resolved value.
    pub value: ConfigValue,
    /// Where the evaluated config was loaded from.
    pub provenance: Provenance,
    /// Index of the matching row.
    pub row_index: usize,
    /// Index of the matching conditional value within the row.
    pub conditional_value_index: usize,
    /// Index of the selected weighted value, if the value was weighted.
    pub weighted_value_index: Option<usize>,
    /// Criteria of the matching conditional value.
    pub criteria: Vec<Criterion>,
}

/// Evaluates configs against a single snapshot.
pub(crate) struct Evaluator<'a> {
    data: &'a MergedConfigData,
    env: &'a dyn EnvLookup,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(data: &'a MergedConfigData, env: &'a dyn EnvLookup) -> Evaluator<'a> {
        Evaluator { data, env }
    }

    /// Find the first matching value. Rows are evaluated top to bottom, and within a row, values
    /// top to bottom. Rows scoped to a different environment are skipped.
    ///
    /// Returns `Ok(None)` when nothing matches.
    pub(crate) fn evaluate(
        &self,
        element: &ConfigElement,
        lookup: &LookupContext,
    ) -> Result<Option<Match>, EvaluationError> {
        self.evaluate_at_depth(element, lookup, 0)
    }

    fn evaluate_at_depth(
        &self,
        element: &ConfigElement,
        lookup: &LookupContext,
        depth: usize,
    ) -> Result<Option<Match>, EvaluationError> {
        let config = &element.config;

        for (row_index, row) in config.rows.iter().enumerate() {
            if row
                .project_env_id
                .is_some_and(|env_id| env_id != self.data.env_id)
            {
                continue;
            }

            for (conditional_value_index, conditional_value) in row.values.iter().enumerate() {
                if !self.criteria_match(&conditional_value.criteria, lookup, depth)? {
                    continue;
                }

                let (value, weighted_value_index) =
                    self.resolve_value(config, conditional_value, lookup)?;

                return Ok(Some(Match {
                    config_key: config.key.clone(),
                    config_id: config.id,
                    value,
                    provenance: element.provenance.clone(),
                    row_index,
                    conditional_value_index,
                    weighted_value_index,
                    criteria: conditional_value.criteria.clone(),
                }));
            }
        }

        Ok(None)
    }

    fn criteria_match(
        &self,
        criteria: &[Criterion],
        lookup: &LookupContext,
        depth: usize,
    ) -> Result<bool, EvaluationError> {
        for criterion in criteria {
            if !self.criterion_matches(criterion, lookup, depth)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn criterion_matches(
        &self,
        criterion: &Criterion,
        lookup: &LookupContext,
        depth: usize,
    ) -> Result<bool, EvaluationError> {
        let operator = criterion.operator;
        match operator {
            CriterionOperator::InSeg | CriterionOperator::NotInSeg => {
                let member = self.in_segment(criterion, lookup, depth)?;
                Ok(member == (operator == CriterionOperator::InSeg))
            }

            _ if operator.is_property_operator() => {
                let property_name = criterion
                    .property_name
                    .as_deref()
                    .ok_or(EvaluationError::MissingPropertyName { operator })?;
                Ok(operator.eval(lookup.get(property_name), criterion.value_to_match.as_ref()))
            }

            _ => Ok(operator.eval(None, criterion.value_to_match.as_ref())),
        }
    }

    /// A context is a member of a segment when the segment evaluates to `true`. Unknown segments
    /// have no members.
    fn in_segment(
        &self,
        criterion: &Criterion,
        lookup: &LookupContext,
        depth: usize,
    ) -> Result<bool, EvaluationError> {
        let Some(segment_key) = criterion.value_to_match.as_ref().and_then(ConfigValue::as_str)
        else {
            return Ok(false);
        };
        if depth >= MAX_SEGMENT_DEPTH {
            return Err(EvaluationError::SegmentDepthExceeded {
                segment: segment_key.to_owned(),
            });
        }
        let Some(segment) = self.data.configs.get(segment_key) else {
            return Ok(false);
        };

        let result = self.evaluate_at_depth(segment, lookup, depth + 1)?;
        Ok(result.is_some_and(|m| m.value == ConfigValue::Bool(true)))
    }

    fn resolve_value(
        &self,
        config: &Config,
        conditional_value: &ConditionalValue,
        lookup: &LookupContext,
    ) -> Result<(ConfigValue, Option<usize>), EvaluationError> {
        match &conditional_value.value {
            ValueSource::Value(value) => Ok((value.clone(), None)),

            ValueSource::Weighted { weighted_values } => {
                let (index, value) = weighted_values.select(&config.key, lookup)?;
                Ok((value.clone(), Some(index)))
            }

            ValueSource::Provided { provided } => {
                let unavailable = || EvaluationError::ProvidedValueUnavailable {
                    env_var: provided.env_var.clone(),
                };
                let raw = self.env.get_var(&provided.env_var).ok_or_else(unavailable)?;
                let value_type = config.value_type.ok_or_else(unavailable)?;
                let value = value_type.coerce(&raw).ok_or_else(unavailable)?;
                Ok((value, None))
            }
        }
    }
}
