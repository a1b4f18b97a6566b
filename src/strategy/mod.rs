//! Strategies decide whether a single rule attached to a feature matches a context.
//!
//! A [`StrategyRegistry`] is populated once at construction with the built-in strategies plus any
//! caller-supplied ones. Bindings naming a strategy that is not registered are evaluated with the
//! [`UnknownStrategy`], which can suppress a decision but never grant one.
mod builtin;
mod rollout;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use builtin::{
    ApplicationHostnameStrategy, DefaultStrategy, RemoteAddressStrategy, UserWithIdStrategy,
};
pub use rollout::{
    FlexibleRolloutStrategy, GradualRolloutRandomStrategy, GradualRolloutSessionIdStrategy,
    GradualRolloutUserIdStrategy,
};

use crate::{
    constraints::all_constraints_hold,
    models::{Parameters, Segment, StrategyBinding, DEFAULT_STICKINESS},
    variant::{select_variant_definition, Variant},
    Context, Error, Result,
};

/// Outcome of a strategy or a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchResult {
    /// Definitely matches.
    Matched,
    /// Definitely does not match.
    NotMatched,
    /// Could match, but the strategy is not known locally.
    Unknown,
}

impl MatchResult {
    /// Returns `true` only for a definite match.
    pub fn is_matched(self) -> bool {
        self == MatchResult::Matched
    }
}

impl From<bool> for MatchResult {
    fn from(value: bool) -> MatchResult {
        if value {
            MatchResult::Matched
        } else {
            MatchResult::NotMatched
        }
    }
}

/// A named evaluation unit.
///
/// Implementations must be pure with respect to the arguments (apart from deliberate randomness)
/// and cheap: they run on every evaluation call.
///
/// # Examples
/// ```
/// # use toggle_engine::{Context, strategy::Strategy, models::Parameters};
/// struct BetaTesters;
///
/// impl Strategy for BetaTesters {
///     fn name(&self) -> &str {
///         "betaTesters"
///     }
///
///     fn is_enabled(&self, _parameters: &Parameters, context: &Context) -> bool {
///         context.get_field("beta").as_deref() == Some("true")
///     }
/// }
/// ```
pub trait Strategy: Send + Sync {
    /// Name the strategy is registered under. Must be non-empty and unique.
    fn name(&self) -> &str;

    /// Returns `true` if the strategy matches `context`.
    fn is_enabled(&self, parameters: &Parameters, context: &Context) -> bool;

    /// Three-valued form of [`Strategy::is_enabled`].
    fn evaluate(&self, parameters: &Parameters, context: &Context) -> MatchResult {
        self.is_enabled(parameters, context).into()
    }
}

/// Stand-in for any strategy that is not registered locally.
///
/// It never resolves to [`MatchResult::Matched`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownStrategy;

impl UnknownStrategy {
    /// Registry name of the strategy.
    pub const NAME: &'static str = "unknown";
}

impl Strategy for UnknownStrategy {
    fn name(&self) -> &str {
        UnknownStrategy::NAME
    }

    fn is_enabled(&self, _parameters: &Parameters, _context: &Context) -> bool {
        false
    }

    fn evaluate(&self, _parameters: &Parameters, _context: &Context) -> MatchResult {
        MatchResult::Unknown
    }
}

/// Result of evaluating one [`StrategyBinding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyEvaluation {
    /// Strategy name as written in the binding.
    pub name: String,
    /// The binding was disabled and therefore not applied.
    pub disabled: bool,
    /// All of the binding's own constraints hold.
    pub constraints: bool,
    /// All referenced segments exist and their constraints hold.
    pub segments: bool,
    /// What the strategy itself decided.
    pub strategy: MatchResult,
    /// Combined result of constraints, segments and strategy.
    pub result: MatchResult,
    /// Variant chosen from the binding's own variants, if it matched and has any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
}

/// Name-indexed set of strategies.
pub struct StrategyRegistry {
    strategies: HashMap<String, Box<dyn Strategy>>,
    unknown: UnknownStrategy,
}

impl StrategyRegistry {
    /// Create a registry holding the built-in strategies and `custom` ones.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyStrategyName`] if a custom strategy has an empty name.
    /// - [`Error::DuplicateStrategy`] if a name is registered twice, including custom strategies
    ///   that reuse a built-in name or `"unknown"`.
    pub fn new(custom: Vec<Box<dyn Strategy>>) -> Result<StrategyRegistry> {
        let mut registry = StrategyRegistry::builtin();
        for strategy in custom {
            let name = strategy.name().to_owned();
            if name.is_empty() {
                return Err(Error::EmptyStrategyName);
            }
            if name == UnknownStrategy::NAME || registry.strategies.contains_key(&name) {
                return Err(Error::DuplicateStrategy(name));
            }
            registry.strategies.insert(name, strategy);
        }
        Ok(registry)
    }

    /// Create a registry holding only the built-in strategies.
    pub fn builtin() -> StrategyRegistry {
        let builtin: [Box<dyn Strategy>; 8] = [
            Box::new(DefaultStrategy),
            Box::new(UserWithIdStrategy),
            Box::new(RemoteAddressStrategy),
            Box::new(ApplicationHostnameStrategy::new()),
            Box::new(GradualRolloutUserIdStrategy),
            Box::new(GradualRolloutSessionIdStrategy),
            Box::new(GradualRolloutRandomStrategy),
            Box::new(FlexibleRolloutStrategy),
        ];

        StrategyRegistry {
            strategies: builtin
                .into_iter()
                .map(|strategy| (strategy.name().to_owned(), strategy))
                .collect(),
            unknown: UnknownStrategy,
        }
    }

    /// Replace the `applicationHostname` strategy with one pinned to `hostname`.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> StrategyRegistry {
        let strategy = ApplicationHostnameStrategy::with_hostname(hostname);
        self.strategies
            .insert(strategy.name().to_owned(), Box::new(strategy));
        self
    }

    /// Look up a strategy, falling back to [`UnknownStrategy`].
    pub fn get(&self, name: &str) -> &dyn Strategy {
        match self.strategies.get(name) {
            Some(strategy) => strategy.as_ref(),
            None => &self.unknown,
        }
    }

    /// Returns `true` if a strategy with `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Evaluate one binding: its constraints, its segments and its strategy, ANDed together.
    ///
    /// An unknown strategy turns an otherwise passing binding into [`MatchResult::Unknown`]. A
    /// segment id missing from `segments` fails the binding.
    pub fn evaluate_binding(
        &self,
        binding: &StrategyBinding,
        context: &Context,
        segments: &HashMap<i64, Segment>,
    ) -> StrategyEvaluation {
        let constraints = all_constraints_hold(&binding.constraints, context);
        let segments_hold = binding.segments.iter().all(|id| {
            segments
                .get(id)
                .is_some_and(|segment| segment.eval(context))
        });

        let strategy = if binding.disabled {
            MatchResult::NotMatched
        } else {
            self.get(&binding.name)
                .evaluate(&binding.parameters, context)
        };

        let result = if binding.disabled || !constraints || !segments_hold {
            MatchResult::NotMatched
        } else {
            strategy
        };

        let variant = if result.is_matched() {
            binding.variants.first().and_then(|first| {
                let group_id = binding
                    .parameters
                    .get("groupId")
                    .map(String::as_str)
                    .unwrap_or_default();
                let stickiness = if first.stickiness.is_empty() {
                    DEFAULT_STICKINESS
                } else {
                    first.stickiness.as_str()
                };
                select_variant_definition(group_id, stickiness, &binding.variants, context)
                    .map(Variant::from_definition)
            })
        } else {
            None
        };

        StrategyEvaluation {
            name: binding.name.clone(),
            disabled: binding.disabled,
            constraints,
            segments: segments_hold,
            strategy,
            result,
            variant,
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> StrategyRegistry {
        StrategyRegistry::builtin()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.strategies.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("StrategyRegistry")
            .field("strategies", &names)
            .finish()
    }
}

/// Split a comma-separated parameter into trimmed, non-empty entries.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

/// Parse a percentage parameter. Missing or malformed values are `None`.
pub(crate) fn percentage(parameters: &Parameters, name: &str) -> Option<f64> {
    parameters
        .get(name)?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| !p.is_nan())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::{Constraint, Operator, VariantDefinition};

    struct AlwaysOn(&'static str);

    impl Strategy for AlwaysOn {
        fn name(&self) -> &str {
            self.0
        }

        fn is_enabled(&self, _parameters: &Parameters, _context: &Context) -> bool {
            true
        }
    }

    fn no_segments() -> HashMap<i64, Segment> {
        HashMap::new()
    }

    #[test]
    fn registers_builtins() {
        let registry = StrategyRegistry::builtin();
        for name in [
            "default",
            "userWithId",
            "remoteAddress",
            "applicationHostname",
            "gradualRolloutUserId",
            "gradualRolloutSessionId",
            "gradualRolloutRandom",
            "flexibleRollout",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn accepts_custom_strategies() {
        let registry = StrategyRegistry::new(vec![Box::new(AlwaysOn("custom"))]).unwrap();
        let result = registry.evaluate_binding(
            &StrategyBinding::new("custom"),
            &Context::new(),
            &no_segments(),
        );
        assert_eq!(result.result, MatchResult::Matched);
    }

    #[test]
    fn rejects_empty_names() {
        assert!(matches!(
            StrategyRegistry::new(vec![Box::new(AlwaysOn(""))]),
            Err(Error::EmptyStrategyName)
        ));
    }

    #[test]
    fn rejects_duplicates() {
        assert!(matches!(
            StrategyRegistry::new(vec![Box::new(AlwaysOn("x")), Box::new(AlwaysOn("x"))]),
            Err(Error::DuplicateStrategy(name)) if name == "x"
        ));
        assert!(matches!(
            StrategyRegistry::new(vec![Box::new(AlwaysOn("default"))]),
            Err(Error::DuplicateStrategy(name)) if name == "default"
        ));
        assert!(matches!(
            StrategyRegistry::new(vec![Box::new(AlwaysOn("unknown"))]),
            Err(Error::DuplicateStrategy(name)) if name == "unknown"
        ));
    }

    #[test]
    fn unknown_strategy_propagates_unknown() {
        let registry = StrategyRegistry::builtin();
        let binding = StrategyBinding::new("someServerSidePlugin")
            .with_constraint(Constraint::new("userId", Operator::In, ["a"]));

        let passing = registry.evaluate_binding(
            &binding,
            &Context::new().with_user_id("a"),
            &no_segments(),
        );
        assert_eq!(passing.result, MatchResult::Unknown);

        let failing = registry.evaluate_binding(
            &binding,
            &Context::new().with_user_id("b"),
            &no_segments(),
        );
        assert_eq!(failing.result, MatchResult::NotMatched);
    }

    #[test]
    fn constraints_are_anded_with_strategy() {
        let registry = StrategyRegistry::builtin();
        let binding = StrategyBinding::new("default")
            .with_constraint(Constraint::new("country", Operator::In, ["NO"]));

        let matched = registry.evaluate_binding(
            &binding,
            &Context::new().with_property("country", "NO"),
            &no_segments(),
        );
        assert_eq!(matched.result, MatchResult::Matched);
        assert!(matched.constraints);

        let unmatched = registry.evaluate_binding(&binding, &Context::new(), &no_segments());
        assert_eq!(unmatched.result, MatchResult::NotMatched);
        assert_eq!(unmatched.strategy, MatchResult::Matched);
        assert!(!unmatched.constraints);
    }

    #[test]
    fn segments_are_anded_with_strategy() {
        let registry = StrategyRegistry::builtin();
        let segments = HashMap::from([(
            5,
            Segment {
                id: 5,
                name: None,
                constraints: vec![Constraint::new("plan", Operator::In, ["pro"])],
            },
        )]);
        let binding = StrategyBinding::new("default").with_segment(5);

        let pro = Context::new().with_property("plan", "pro");
        assert!(registry.evaluate_binding(&binding, &pro, &segments).result.is_matched());

        let free = Context::new().with_property("plan", "free");
        let result = registry.evaluate_binding(&binding, &free, &segments);
        assert_eq!(result.result, MatchResult::NotMatched);
        assert!(!result.segments);
    }

    #[test]
    fn missing_segment_fails_the_binding() {
        let registry = StrategyRegistry::builtin();
        let binding = StrategyBinding::new("default").with_segment(404);
        let result = registry.evaluate_binding(&binding, &Context::new(), &no_segments());
        assert_eq!(result.result, MatchResult::NotMatched);
    }

    #[test]
    fn disabled_binding_never_matches() {
        let registry = StrategyRegistry::builtin();
        let mut binding = StrategyBinding::new("default");
        binding.disabled = true;
        let result = registry.evaluate_binding(&binding, &Context::new(), &no_segments());
        assert!(result.disabled);
        assert_eq!(result.result, MatchResult::NotMatched);
    }

    #[test]
    fn matching_binding_selects_its_own_variant() {
        let registry = StrategyRegistry::builtin();
        let mut binding = StrategyBinding::new("default").with_parameter("groupId", "g");
        binding.variants = vec![VariantDefinition::new("strategy-variant", 1)];

        let result =
            registry.evaluate_binding(&binding, &Context::new().with_user_id("u"), &no_segments());
        let variant = result.variant.unwrap();
        assert_eq!(variant.name, "strategy-variant");
        assert!(variant.enabled);
        assert!(variant.feature_enabled);
    }
}
