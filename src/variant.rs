//! Weighted, sticky variant selection.
use std::borrow::Cow;

use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    models::{FeatureDefinition, Payload, VariantDefinition, DEFAULT_STICKINESS},
    normalize::normalize,
    Context,
};

/// Name of the variant returned when no variant applies.
pub const DISABLED_VARIANT_NAME: &str = "disabled";

/// Fields consulted, in order, by `"default"` stickiness.
const DEFAULT_STICKINESS_FIELDS: [&str; 3] = ["userId", "sessionId", "remoteAddress"];

/// A variant resolved for a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// `true` if this is a real variant rather than a fallback.
    pub enabled: bool,
    /// Whether the feature itself was enabled for the caller.
    pub feature_enabled: bool,
}

impl Variant {
    /// The well-known fallback variant: `{ name: "disabled", enabled: false }`.
    pub fn disabled() -> Variant {
        Variant {
            name: DISABLED_VARIANT_NAME.to_owned(),
            payload: None,
            enabled: false,
            feature_enabled: false,
        }
    }

    pub(crate) fn from_definition(definition: &VariantDefinition) -> Variant {
        Variant {
            name: definition.name.clone(),
            payload: definition.payload.clone(),
            enabled: true,
            feature_enabled: true,
        }
    }
}

impl Default for Variant {
    fn default() -> Variant {
        Variant::disabled()
    }
}

/// Select one of the feature's variants for `context`.
///
/// The stickiness of the first variant applies to the whole set and the feature name is used as
/// the hashing group. Returns `None` if there are no variants or their total weight is zero.
pub fn select_variant<'a>(
    feature: &'a FeatureDefinition,
    context: &Context,
) -> Option<&'a VariantDefinition> {
    let stickiness = feature.variants.first()?.stickiness.as_str();
    select_variant_definition(&feature.name, stickiness, &feature.variants, context)
}

/// Weighted, sticky choice among `variants`.
///
/// 1. Zero total weight selects nothing.
/// 2. The first variant (in list order) with an override matching `context` wins outright.
/// 3. Otherwise the stickiness seed is hashed into `[1, total_weight]` and variants are walked in
///    order, accumulating weights, until the running total reaches the target.
///
/// When the stickiness field is absent from `context`, the seed is random, so repeated calls for
/// the same anonymous caller may select different variants.
pub fn select_variant_definition<'a>(
    group_id: &str,
    stickiness: &str,
    variants: &'a [VariantDefinition],
    context: &Context,
) -> Option<&'a VariantDefinition> {
    let total_weight = variants
        .iter()
        .fold(0u32, |acc, variant| acc.saturating_add(variant.weight));
    if total_weight == 0 {
        return None;
    }

    if let Some(variant) = find_override(variants, context) {
        return Some(variant);
    }

    let seed = stickiness_seed(context, stickiness);
    let target = normalize(&seed, group_id, total_weight);

    let mut counter = 0u32;
    for variant in variants {
        if variant.weight == 0 {
            continue;
        }
        counter = counter.saturating_add(variant.weight);
        if counter >= target {
            return Some(variant);
        }
    }

    None
}

fn find_override<'a>(
    variants: &'a [VariantDefinition],
    context: &Context,
) -> Option<&'a VariantDefinition> {
    variants.iter().find(|variant| {
        variant.overrides.iter().any(|o| {
            context
                .get_field(&o.context_name)
                .is_some_and(|value| o.values.iter().any(|v| v == &*value))
        })
    })
}

fn stickiness_seed<'a>(context: &'a Context, stickiness: &str) -> Cow<'a, str> {
    let resolved = if stickiness == DEFAULT_STICKINESS {
        DEFAULT_STICKINESS_FIELDS
            .iter()
            .find_map(|field| context.get_field(field))
    } else {
        context.get_field(stickiness)
    };

    resolved.unwrap_or_else(random_seed)
}

fn random_seed<'a>() -> Cow<'a, str> {
    Cow::Owned(thread_rng().gen_range(0..=100_000u32).to_string())
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn selection_is_deterministic(
            user_id in "[a-zA-Z0-9]{1,30}",
            weights in proptest::collection::vec(0u32..1000, 1..6),
        ) {
            let variants = weights
                .iter()
                .enumerate()
                .map(|(i, w)| VariantDefinition::new(format!("v{i}"), *w))
                .collect::<Vec<_>>();
            let context = Context::new().with_user_id(user_id);

            let first =
                select_variant_definition("feature", DEFAULT_STICKINESS, &variants, &context);
            let second =
                select_variant_definition("feature", DEFAULT_STICKINESS, &variants, &context);
            prop_assert_eq!(first, second);

            let total: u32 = weights.iter().sum();
            prop_assert_eq!(first.is_some(), total > 0);
            if let Some(variant) = first {
                prop_assert!(variant.weight > 0);
            }
        }
    }
}
