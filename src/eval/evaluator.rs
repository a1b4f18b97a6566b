use std::sync::Arc;

use crate::{
    repository::Repository, strategy::StrategyRegistry, variant::Variant, Context,
};

use super::{is_enabled, resolve_variant, EvaluationResult};

/// Evaluator binds the evaluation functions to a repository and a strategy registry.
///
/// Every call takes the repository's snapshot once and evaluates entirely against it.
pub struct Evaluator {
    repository: Arc<Repository>,
    strategies: StrategyRegistry,
}

impl Evaluator {
    #[allow(missing_docs)]
    pub fn new(repository: Arc<Repository>, strategies: StrategyRegistry) -> Evaluator {
        Evaluator {
            repository,
            strategies,
        }
    }

    /// See [`is_enabled`](super::is_enabled).
    pub fn is_enabled(
        &self,
        name: &str,
        context: &Context,
        fallback: impl FnOnce(&str, &Context) -> bool,
    ) -> EvaluationResult {
        let snapshot = self.repository.snapshot();
        let result = is_enabled(&snapshot, &self.strategies, name, context, fallback);
        log::trace!(target: "toggle_engine",
                    feature = name,
                    context:serde = context,
                    result:serde = result.enabled;
                    "evaluated a feature");
        result
    }

    /// See [`resolve_variant`](super::resolve_variant).
    pub fn get_variant(
        &self,
        name: &str,
        context: &Context,
        fallback: Option<&Variant>,
    ) -> Variant {
        let snapshot = self.repository.snapshot();
        let variant = resolve_variant(&snapshot, &self.strategies, name, context, fallback, None);
        log::trace!(target: "toggle_engine",
                    feature = name,
                    context:serde = context,
                    variant = variant.name.as_str();
                    "resolved a variant");
        variant
    }

    /// Like [`Evaluator::get_variant`], but takes the feature's evaluation from `forced`.
    pub fn force_get_variant(
        &self,
        name: &str,
        context: &Context,
        forced: &EvaluationResult,
        fallback: Option<&Variant>,
    ) -> Variant {
        let snapshot = self.repository.snapshot();
        resolve_variant(
            &snapshot,
            &self.strategies,
            name,
            context,
            fallback,
            Some(forced),
        )
    }

    /// The repository this evaluator reads from.
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("repository", &self.repository)
            .field("strategies", &self.strategies)
            .finish()
    }
}
