use crate::{
    models::{FeatureDefinition, Snapshot},
    strategy::{MatchResult, StrategyRegistry},
    Context,
};

use super::{eval_variant::resolve_variant, Evaluation, EvaluationResult};

/// Evaluate the feature named `name`.
///
/// - Unknown feature: `fallback(name, context)` decides, with no strategy details.
/// - Feature without bindings: its own `enabled` flag decides.
/// - Otherwise every binding is evaluated. Any definite match enables the feature. Failing that,
///   any unknown binding makes the result [`Evaluation::Unknown`]. Otherwise it is disabled.
///
/// A feature whose parent dependencies are not satisfied is disabled regardless of its bindings.
pub fn is_enabled(
    snapshot: &Snapshot,
    strategies: &StrategyRegistry,
    name: &str,
    context: &Context,
    fallback: impl FnOnce(&str, &Context) -> bool,
) -> EvaluationResult {
    let Some(feature) = snapshot.get_feature(name) else {
        return EvaluationResult::from_decision(fallback(name, context));
    };

    let mut result = evaluate_feature(snapshot, strategies, feature, context);
    if !dependencies_satisfied(snapshot, strategies, feature, context) {
        result.enabled = Evaluation::Disabled;
        result.variant = None;
        result.has_unsatisfied_dependency = true;
    }
    result
}

/// Evaluate `feature`'s own bindings, ignoring its dependencies.
pub fn evaluate_feature(
    snapshot: &Snapshot,
    strategies: &StrategyRegistry,
    feature: &FeatureDefinition,
    context: &Context,
) -> EvaluationResult {
    if feature.strategies.is_empty() {
        return EvaluationResult::from_decision(feature.enabled);
    }

    let evaluations = feature
        .strategies
        .iter()
        .map(|binding| strategies.evaluate_binding(binding, context, &snapshot.segments))
        .collect::<Vec<_>>();

    let (enabled, variant) = match evaluations
        .iter()
        .find(|evaluation| evaluation.result.is_matched())
    {
        Some(matched) => (Evaluation::Enabled, matched.variant.clone()),
        None if evaluations
            .iter()
            .any(|evaluation| evaluation.result == MatchResult::Unknown) =>
        {
            (Evaluation::Unknown, None)
        }
        None => (Evaluation::Disabled, None),
    };

    EvaluationResult {
        enabled,
        strategies: evaluations,
        variant,
        has_unsatisfied_dependency: false,
    }
}

/// Parents must exist, must not have dependencies themselves, and must be in the expected state.
pub(super) fn dependencies_satisfied(
    snapshot: &Snapshot,
    strategies: &StrategyRegistry,
    feature: &FeatureDefinition,
    context: &Context,
) -> bool {
    feature.dependencies.iter().all(|dependency| {
        let Some(parent) = snapshot.get_feature(&dependency.feature) else {
            return false;
        };
        if !parent.dependencies.is_empty() {
            return false;
        }

        let expect_enabled = dependency.enabled.unwrap_or(true);
        if expect_enabled != parent.enabled {
            return false;
        }

        if !expect_enabled {
            return !evaluate_feature(snapshot, strategies, parent, context).is_enabled();
        }

        match dependency.variants.as_deref() {
            Some(variants) if !variants.is_empty() => {
                let selected =
                    resolve_variant(snapshot, strategies, &parent.name, context, None, None);
                variants.contains(&selected.name)
            }
            _ => evaluate_feature(snapshot, strategies, parent, context).is_enabled(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            ClientFeatures, Constraint, FeatureDependency, Operator, Segment, StrategyBinding,
            VariantDefinition,
        },
        strategy::StrategyRegistry,
    };

    fn snapshot(features: Vec<FeatureDefinition>) -> Snapshot {
        ClientFeatures::new(features, vec![]).into()
    }

    fn evaluate(snapshot: &Snapshot, name: &str, context: &Context) -> EvaluationResult {
        is_enabled(
            snapshot,
            &StrategyRegistry::builtin(),
            name,
            context,
            |_, _| false,
        )
    }

    fn only_user(id: &str) -> StrategyBinding {
        StrategyBinding::new("userWithId").with_parameter("userIds", id)
    }

    #[test]
    fn missing_feature_uses_fallback() {
        let snapshot = snapshot(vec![]);
        let registry = StrategyRegistry::builtin();

        let result = is_enabled(&snapshot, &registry, "nope", &Context::new(), |name, _| {
            name == "nope"
        });

        assert_eq!(result.enabled, Evaluation::Enabled);
        assert!(result.strategies.is_empty());
    }

    #[test]
    fn feature_without_strategies_uses_its_flag() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("on", true),
            FeatureDefinition::new("off", false),
        ]);
        assert!(evaluate(&snapshot, "on", &Context::new()).is_enabled());
        assert!(!evaluate(&snapshot, "off", &Context::new()).is_enabled());
    }

    #[test]
    fn bindings_are_evaluated_even_when_feature_flag_is_off() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("f", false).with_strategy(StrategyBinding::new("default"))
        ]);
        assert!(evaluate(&snapshot, "f", &Context::new()).is_enabled());
    }

    #[test]
    fn any_match_enables() {
        let snapshot = snapshot(vec![FeatureDefinition::new("f", true)
            .with_strategy(only_user("a"))
            .with_strategy(only_user("b"))]);

        let result = evaluate(&snapshot, "f", &Context::new().with_user_id("b"));
        assert!(result.is_enabled());
        assert_eq!(result.strategies.len(), 2);
        assert_eq!(result.strategies[0].result, MatchResult::NotMatched);
        assert_eq!(result.strategies[1].result, MatchResult::Matched);

        assert_eq!(
            evaluate(&snapshot, "f", &Context::new().with_user_id("c")).enabled,
            Evaluation::Disabled
        );
    }

    #[test]
    fn unknown_only_when_nothing_matched() {
        let snapshot = snapshot(vec![FeatureDefinition::new("f", true)
            .with_strategy(StrategyBinding::new("notInstalledHere"))
            .with_strategy(only_user("a"))]);

        assert_eq!(
            evaluate(&snapshot, "f", &Context::new().with_user_id("a")).enabled,
            Evaluation::Enabled
        );
        let result = evaluate(&snapshot, "f", &Context::new().with_user_id("z"));
        assert_eq!(result.enabled, Evaluation::Unknown);
        assert!(!result.is_enabled());
    }

    #[test]
    fn first_matching_strategy_variant_is_reported() {
        let mut first = StrategyBinding::new("default").with_parameter("groupId", "f");
        first.variants = vec![VariantDefinition::new("from-first", 1)];
        let mut second = StrategyBinding::new("default");
        second.variants = vec![VariantDefinition::new("from-second", 1)];
        let snapshot = snapshot(vec![FeatureDefinition::new("f", true)
            .with_strategy(first)
            .with_strategy(second)]);

        let result = evaluate(&snapshot, "f", &Context::new().with_user_id("u"));

        assert_eq!(result.variant.unwrap().name, "from-first");
    }

    #[test]
    fn segments_come_from_the_same_snapshot() {
        let snapshot: Snapshot = ClientFeatures::new(
            vec![FeatureDefinition::new("f", true)
                .with_strategy(StrategyBinding::new("default").with_segment(1))],
            vec![Segment {
                id: 1,
                name: None,
                constraints: vec![Constraint::new("region", Operator::In, ["eu"])],
            }],
        )
        .into();

        let eu = Context::new().with_property("region", "eu");
        let us = Context::new().with_property("region", "us");
        assert!(evaluate(&snapshot, "f", &eu).is_enabled());
        assert!(!evaluate(&snapshot, "f", &us).is_enabled());
    }

    fn depends_on(
        parent: &str,
        enabled: Option<bool>,
        variants: Option<Vec<&str>>,
    ) -> FeatureDependency {
        FeatureDependency {
            feature: parent.to_owned(),
            enabled,
            variants: variants.map(|v| v.into_iter().map(str::to_owned).collect()),
        }
    }

    #[test]
    fn dependency_on_enabled_parent() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("parent", true).with_strategy(only_user("a")),
            FeatureDefinition::new("child", true)
                .with_strategy(StrategyBinding::new("default"))
                .with_dependency(depends_on("parent", None, None)),
        ]);

        assert!(evaluate(&snapshot, "child", &Context::new().with_user_id("a")).is_enabled());

        let blocked = evaluate(&snapshot, "child", &Context::new().with_user_id("b"));
        assert!(!blocked.is_enabled());
        assert!(blocked.has_unsatisfied_dependency);
        assert_eq!(blocked.strategies.len(), 1);
    }

    #[test]
    fn dependency_on_disabled_parent() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("kill-switch", false),
            FeatureDefinition::new("child", true)
                .with_dependency(depends_on("kill-switch", Some(false), None)),
        ]);
        assert!(evaluate(&snapshot, "child", &Context::new()).is_enabled());
    }

    #[test]
    fn dependency_on_missing_or_nested_parent_fails() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("grandparent", true),
            FeatureDefinition::new("parent", true)
                .with_dependency(depends_on("grandparent", None, None)),
            FeatureDefinition::new("orphan", true).with_dependency(depends_on("gone", None, None)),
            FeatureDefinition::new("child", true).with_dependency(depends_on("parent", None, None)),
        ]);

        assert!(evaluate(&snapshot, "parent", &Context::new()).is_enabled());
        assert!(!evaluate(&snapshot, "orphan", &Context::new()).is_enabled());
        assert!(!evaluate(&snapshot, "child", &Context::new()).is_enabled());
    }

    #[test]
    fn dependency_on_parent_variant() {
        let snapshot = snapshot(vec![
            FeatureDefinition::new("parent", true)
                .with_variant(VariantDefinition::new("blue", 1)),
            FeatureDefinition::new("wants-blue", true)
                .with_dependency(depends_on("parent", None, Some(vec!["blue"]))),
            FeatureDefinition::new("wants-red", true)
                .with_dependency(depends_on("parent", None, Some(vec!["red"]))),
        ]);
        let context = Context::new().with_user_id("u");

        assert!(evaluate(&snapshot, "wants-blue", &context).is_enabled());
        assert!(!evaluate(&snapshot, "wants-red", &context).is_enabled());
    }
}
