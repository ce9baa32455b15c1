use std::borrow::Cow;

use crate::{
    config::WeightedValues,
    sharder::{Md5Sharder, Sharder},
    ConfigValue, EvaluationError, LookupContext,
};

impl WeightedValues {
    /// Deterministically pick one of the weighted values for the given context.
    ///
    /// The seed is `"{config_key}{hash_value}"`, where `hash_value` is the rendered value of
    /// `hash_by_property_name` in the lookup context, falling back to the context-set fingerprint
    /// (empty when no context carries a key). The seed is sharded into `[0, total_weight)` and the
    /// value whose cumulative weight range contains the shard wins.
    pub(crate) fn select(
        &self,
        config_key: &str,
        lookup: &LookupContext,
    ) -> Result<(usize, &ConfigValue), EvaluationError> {
        let total_weight: u64 = self.weighted_values.iter().map(|w| w.weight as u64).sum();
        if total_weight == 0 {
            return Err(EvaluationError::InvalidWeights);
        }

        let hash_value = self.hash_value(lookup);
        let shard = Md5Sharder.get_shard(format!("{config_key}{hash_value}"), total_weight);

        let mut upper = 0;
        for (index, weighted) in self.weighted_values.iter().enumerate() {
            upper += weighted.weight as u64;
            if shard < upper {
                return Ok((index, &weighted.value));
            }
        }

        // shard < total_weight, so the loop always returns.
        Err(EvaluationError::InvalidWeights)
    }

    fn hash_value<'a>(&self, lookup: &'a LookupContext) -> Cow<'a, str> {
        self.hash_by_property_name
            .as_deref()
            .and_then(|property| lookup.get(property))
            .and_then(ConfigValue::to_match_string)
            .unwrap_or_else(|| Cow::Owned(lookup.context_set().fingerprint()))
    }
}
