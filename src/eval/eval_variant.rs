use crate::{
    models::Snapshot,
    strategy::StrategyRegistry,
    variant::{select_variant, Variant},
    Context,
};

use super::{
    eval_feature::{dependencies_satisfied, evaluate_feature},
    EvaluationResult,
};

/// Resolve the variant of the feature named `name` for `context`.
///
/// If `forced` is given, it is used as the feature's evaluation instead of evaluating its
/// bindings again.
///
/// Resolution order:
/// 1. Unknown feature or unsatisfied dependency: the fallback, with `feature_enabled = false`.
/// 2. Feature not enabled: the fallback.
/// 3. The variant of the binding that enabled the feature, if any.
/// 4. A feature-level variant selected for `context`, if the feature's own flag is on.
/// 5. Otherwise the fallback, with `feature_enabled = true`.
///
/// The fallback is `fallback` if given, else [`Variant::disabled`]. A caller-supplied fallback
/// is returned as is.
pub fn resolve_variant(
    snapshot: &Snapshot,
    strategies: &StrategyRegistry,
    name: &str,
    context: &Context,
    fallback: Option<&Variant>,
    forced: Option<&EvaluationResult>,
) -> Variant {
    let Some(feature) = snapshot.get_feature(name) else {
        return fallback.cloned().unwrap_or_default();
    };
    if !dependencies_satisfied(snapshot, strategies, feature, context) {
        return fallback.cloned().unwrap_or_default();
    }

    let evaluated;
    let result = match forced {
        Some(forced) => forced,
        None => {
            evaluated = evaluate_feature(snapshot, strategies, feature, context);
            &evaluated
        }
    };
    let enabled = result.is_enabled();

    let fallback = match fallback {
        Some(fallback) => fallback.clone(),
        None => Variant {
            feature_enabled: enabled,
            ..Variant::disabled()
        },
    };

    if !enabled {
        return fallback;
    }
    if let Some(variant) = &result.variant {
        return variant.clone();
    }
    if feature.variants.is_empty() || !feature.enabled {
        return fallback;
    }

    match select_variant(feature, context) {
        Some(definition) => Variant::from_definition(definition),
        None => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        eval::Evaluation,
        models::{ClientFeatures, FeatureDefinition, Payload, StrategyBinding, VariantDefinition},
    };

    fn snapshot(features: Vec<FeatureDefinition>) -> Snapshot {
        ClientFeatures::new(features, vec![]).into()
    }

    fn resolve(snapshot: &Snapshot, name: &str, fallback: Option<&Variant>) -> Variant {
        resolve_variant(
            snapshot,
            &StrategyRegistry::builtin(),
            name,
            &Context::new().with_user_id("u-1"),
            fallback,
            None,
        )
    }

    fn custom_fallback() -> Variant {
        Variant {
            name: "fallback".to_owned(),
            payload: None,
            enabled: false,
            feature_enabled: false,
        }
    }

    #[test]
    fn unknown_feature_returns_disabled_variant() {
        let variant = resolve(&snapshot(vec![]), "nope", None);
        assert_eq!(variant, Variant::disabled());
    }

    #[test]
    fn unknown_feature_returns_supplied_fallback() {
        let fallback = custom_fallback();
        assert_eq!(resolve(&snapshot(vec![]), "nope", Some(&fallback)), fallback);
    }

    #[test]
    fn disabled_feature_returns_fallback() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("f", false).with_variant(VariantDefinition::new("a", 1))
        ]);
        let variant = resolve(&snapshot, "f", None);
        assert_eq!(variant.name, "disabled");
        assert!(!variant.feature_enabled);
    }

    #[test]
    fn enabled_feature_without_variants_reports_feature_enabled() {
        let snapshot = snapshot(vec![FeatureDefinition::new("f", true)]);
        let variant = resolve(&snapshot, "f", None);
        assert_eq!(variant.name, "disabled");
        assert!(!variant.enabled);
        assert!(variant.feature_enabled);
    }

    #[test]
    fn selects_feature_variant_with_payload() {
        let mut blue = VariantDefinition::new("blue", 1);
        blue.payload = Some(Payload {
            payload_type: "string".to_owned(),
            value: "#00f".to_owned(),
        });
        let snapshot = snapshot(vec![FeatureDefinition::new("f", true).with_variant(blue)]);

        let variant = resolve(&snapshot, "f", None);

        assert_eq!(variant.name, "blue");
        assert!(variant.enabled);
        assert!(variant.feature_enabled);
        assert_eq!(variant.payload.unwrap().value, "#00f");
    }

    #[test]
    fn zero_weight_variants_fall_back() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("f", true).with_variant(VariantDefinition::new("a", 0))
        ]);
        let variant = resolve(&snapshot, "f", None);
        assert_eq!(variant.name, "disabled");
        assert!(variant.feature_enabled);
    }

    #[test]
    fn strategy_variant_wins_over_feature_variants() {
        let mut binding = StrategyBinding::new("default");
        binding.variants = vec![VariantDefinition::new("from-strategy", 1)];
        let snapshot = snapshot(vec![FeatureDefinition::new("f", true)
            .with_strategy(binding)
            .with_variant(VariantDefinition::new("from-feature", 1))]);

        assert_eq!(resolve(&snapshot, "f", None).name, "from-strategy");
    }

    #[test]
    fn forced_result_skips_strategy_evaluation() {
        let snapshot = snapshot(vec![FeatureDefinition::new("f", true)
            .with_strategy(StrategyBinding::new("userWithId").with_parameter("userIds", "nobody"))
            .with_variant(VariantDefinition::new("a", 1))]);
        let registry = StrategyRegistry::builtin();
        let context = Context::new().with_user_id("u-1");

        let normal = resolve_variant(&snapshot, &registry, "f", &context, None, None);
        assert_eq!(normal.name, "disabled");

        let forced = EvaluationResult::from_decision(true);
        let variant = resolve_variant(&snapshot, &registry, "f", &context, None, Some(&forced));
        assert_eq!(variant.name, "a");

        let forced_off = EvaluationResult {
            enabled: Evaluation::Unknown,
            ..EvaluationResult::from_decision(false)
        };
        let variant = resolve_variant(&snapshot, &registry, "f", &context, None, Some(&forced_off));
        assert_eq!(variant.name, "disabled");
    }
}
