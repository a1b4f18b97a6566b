use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use crate::{
    eval::{EvaluationResult, Evaluator},
    events::EventListener,
    poller_thread::{PollerThreadConfig, RemoteSource},
    repository::Repository,
    strategy::StrategyRegistry,
    variant::Variant,
    ClientConfig, Context, Error, Result,
};

/// The object an application holds to evaluate features.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// Evaluation never blocks and never fails. Until the client is ready, every call returns the
/// fallback and emits a `warn` event.
///
/// # Examples
/// ```
/// # use toggle_engine::{ClientConfig, Context, bootstrap::StaticBootstrap, models::*};
/// let client = ClientConfig::new("checkout-service")
///     .bootstrap(StaticBootstrap::new(ClientFeatures::new(
///         vec![FeatureDefinition::new("new-checkout", true)],
///         vec![],
///     )))
///     .to_client()
///     .unwrap();
/// client.start().unwrap();
///
/// assert!(client.is_enabled("new-checkout", &Context::new().with_user_id("u-1")));
/// ```
pub struct Client {
    static_context: Context,
    evaluator: Evaluator,
    remote: Mutex<Option<(Box<dyn RemoteSource>, PollerThreadConfig)>>,
    destroyed: AtomicBool,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::to_client`].
    pub fn new(config: ClientConfig) -> Result<Client> {
        let mut strategies = StrategyRegistry::new(config.strategies)?;
        if let Some(hostname) = config.hostname {
            strategies = strategies.with_hostname(hostname);
        }

        let mut repository = Repository::new(config.app_name.clone())
            .with_storage(config.storage)
            .with_bootstrap_override(config.bootstrap_override);
        if let Some(bootstrap) = config.bootstrap {
            repository = repository.with_bootstrap(bootstrap);
        }

        let static_context = Context::new()
            .with_app_name(config.app_name)
            .with_environment(config.environment);

        Ok(Client {
            static_context,
            evaluator: Evaluator::new(Arc::new(repository), strategies),
            remote: Mutex::new(
                config
                    .remote_source
                    .map(|source| (source, config.poller_config)),
            ),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Load backup and bootstrap data and start polling the remote source, if one is configured.
    ///
    /// Backup and bootstrap are loaded before this returns. Calling `start` again does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::Destroyed`] after [`Client::destroy`].
    /// - [`Error::Io`] if the poller thread could not be spawned.
    pub fn start(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }

        let repository = self.evaluator.repository();
        repository.start();

        let remote = self
            .remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((source, poller_config)) = remote {
            repository.start_polling(source, poller_config)?;
        }
        Ok(())
    }

    /// Stop polling and detach all listeners. Idempotent.
    ///
    /// After `destroy` returns no further events are emitted. Evaluation keeps working against the
    /// last installed snapshot.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.repository().stop();
    }

    /// `true` once any data has been installed.
    pub fn is_ready(&self) -> bool {
        self.evaluator.repository().is_ready()
    }

    /// Block until the client is ready or `timeout` elapses. Returns readiness.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        self.evaluator.repository().wait_until_ready(timeout)
    }

    /// Register a listener for `ready`, `changed`, `warn` and `error` events.
    ///
    /// ```
    /// # use toggle_engine::{ClientConfig, events::Event};
    /// let client = ClientConfig::new("app").to_client().unwrap();
    /// client.on_event(|event: &Event| println!("{}", event.name()));
    /// ```
    pub fn on_event(&self, listener: impl EventListener + 'static) {
        self.evaluator.repository().subscribe(Arc::new(listener));
    }

    /// Returns `true` if the feature is definitely enabled for `context`.
    ///
    /// Unknown features and an unknown result are `false`.
    pub fn is_enabled(&self, name: &str, context: &Context) -> bool {
        self.is_enabled_with_fallback(name, context, |_, _| false)
    }

    /// Like [`Client::is_enabled`], with `fallback` deciding for unknown features and before the
    /// client is ready.
    pub fn is_enabled_with_fallback(
        &self,
        name: &str,
        context: &Context,
        fallback: impl FnOnce(&str, &Context) -> bool,
    ) -> bool {
        self.is_enabled_details(name, context, fallback).is_enabled()
    }

    /// Evaluate the feature and return per-strategy details.
    pub fn is_enabled_details(
        &self,
        name: &str,
        context: &Context,
        fallback: impl FnOnce(&str, &Context) -> bool,
    ) -> EvaluationResult {
        let context = Context::merged(&self.static_context, context);
        if !self.is_ready() {
            self.warn_not_ready("is_enabled", name);
            return EvaluationResult::from_decision(fallback(name, &context));
        }
        self.evaluator.is_enabled(name, &context, fallback)
    }

    /// Resolve the variant of the feature for `context`, falling back to [`Variant::disabled`].
    pub fn get_variant(&self, name: &str, context: &Context) -> Variant {
        self.resolve_variant(name, context, None, None)
    }

    /// Like [`Client::get_variant`], returning `fallback` instead of [`Variant::disabled`].
    pub fn get_variant_with_fallback(
        &self,
        name: &str,
        context: &Context,
        fallback: &Variant,
    ) -> Variant {
        self.resolve_variant(name, context, Some(fallback), None)
    }

    /// Resolve the variant using an evaluation the caller already has, instead of evaluating the
    /// feature's strategies again.
    pub fn force_get_variant(
        &self,
        name: &str,
        context: &Context,
        forced: &EvaluationResult,
        fallback: Option<&Variant>,
    ) -> Variant {
        self.resolve_variant(name, context, fallback, Some(forced))
    }

    fn resolve_variant(
        &self,
        name: &str,
        context: &Context,
        fallback: Option<&Variant>,
        forced: Option<&EvaluationResult>,
    ) -> Variant {
        let context = Context::merged(&self.static_context, context);
        if !self.is_ready() {
            self.warn_not_ready("get_variant", name);
            return fallback.cloned().unwrap_or_default();
        }
        match forced {
            Some(forced) => self
                .evaluator
                .force_get_variant(name, &context, forced, fallback),
            None => self.evaluator.get_variant(name, &context, fallback),
        }
    }

    fn warn_not_ready(&self, operation: &str, name: &str) {
        self.evaluator.repository().warn(format!(
            "client has not been initialized yet, {operation}({name}) returned the fallback"
        ));
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("static_context", &self.static_context)
            .field("evaluator", &self.evaluator)
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
