//! Evaluation of features against a snapshot.
//!
//! The free functions operate on one [`Snapshot`](crate::models::Snapshot) passed in by the
//! caller, so a single call never observes two different snapshots. [`Evaluator`] binds them to a
//! [`Repository`](crate::repository::Repository).
mod eval_feature;
mod eval_variant;
mod evaluator;

use serde::{Deserialize, Serialize};

pub use eval_feature::{evaluate_feature, is_enabled};
pub use eval_variant::resolve_variant;
pub use evaluator::Evaluator;

use crate::{
    strategy::{MatchResult, StrategyEvaluation},
    variant::Variant,
};

/// Three-valued feature decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Evaluation {
    #[allow(missing_docs)]
    Enabled,
    #[allow(missing_docs)]
    Disabled,
    /// Some binding uses a strategy that is not registered locally, and no binding matched.
    Unknown,
}

impl Evaluation {
    /// Only [`Evaluation::Enabled`] counts as enabled.
    pub fn is_enabled(self) -> bool {
        self == Evaluation::Enabled
    }
}

impl From<bool> for Evaluation {
    fn from(value: bool) -> Evaluation {
        if value {
            Evaluation::Enabled
        } else {
            Evaluation::Disabled
        }
    }
}

impl From<MatchResult> for Evaluation {
    fn from(value: MatchResult) -> Evaluation {
        match value {
            MatchResult::Matched => Evaluation::Enabled,
            MatchResult::NotMatched => Evaluation::Disabled,
            MatchResult::Unknown => Evaluation::Unknown,
        }
    }
}

/// Outcome of evaluating a feature, with per-binding details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Aggregated decision.
    pub enabled: Evaluation,
    /// One entry per binding, in binding order. Empty for fallbacks and rule-less features.
    pub strategies: Vec<StrategyEvaluation>,
    /// Variant chosen by the first definitely-matching binding, if it carries variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// A parent dependency is not satisfied. The feature is then disabled.
    #[serde(default)]
    pub has_unsatisfied_dependency: bool,
}

impl EvaluationResult {
    /// Result without strategy details.
    pub fn from_decision(enabled: bool) -> EvaluationResult {
        EvaluationResult {
            enabled: enabled.into(),
            strategies: Vec::new(),
            variant: None,
            has_unsatisfied_dependency: false,
        }
    }

    /// `true` only for a definite [`Evaluation::Enabled`].
    pub fn is_enabled(&self) -> bool {
        self.enabled.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use serde::Deserialize;

    use crate::{
        models::{ClientFeatures, Snapshot},
        strategy::StrategyRegistry,
        Context,
    };

    use super::{is_enabled, resolve_variant};

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TestCase {
        feature: String,
        context: Context,
        enabled: bool,
        #[serde(default)]
        variant: Option<String>,
    }

    #[test]
    fn evaluation_cases() {
        let _ = env_logger::builder().is_test(true).try_init();

        let features: ClientFeatures =
            serde_json::from_reader(File::open("tests/data/client-features.json").unwrap())
                .unwrap();
        let (snapshot, problems): (Snapshot, _) = features.into_snapshot();
        // Only the deliberately malformed fixture is reported.
        assert_eq!(problems.len(), 1, "{problems:?}");

        let cases: Vec<TestCase> =
            serde_json::from_reader(File::open("tests/data/cases.json").unwrap()).unwrap();
        let strategies = StrategyRegistry::builtin();

        for case in cases {
            print!("{} {:?}", case.feature, case.context);

            let result = is_enabled(&snapshot, &strategies, &case.feature, &case.context, |_, _| {
                false
            });
            assert_eq!(
                result.is_enabled(),
                case.enabled,
                "feature {} for {:?}",
                case.feature,
                case.context
            );

            if let Some(expected) = &case.variant {
                let variant = resolve_variant(
                    &snapshot,
                    &strategies,
                    &case.feature,
                    &case.context,
                    None,
                    None,
                );
                assert_eq!(
                    &variant.name, expected,
                    "variant of {} for {:?}",
                    case.feature, case.context
                );
            }

            println!(" OK");
        }
    }
}
