use std::sync::Arc;

use crate::{
    bootstrap::BootstrapProvider,
    poller_thread::{PollerThreadConfig, RemoteSource},
    storage::{BackupStore, InMemoryStorage},
    strategy::Strategy,
    Client, Result,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use toggle_engine::{ClientConfig, bootstrap::StaticBootstrap, models::*};
/// let client = ClientConfig::new("checkout-service")
///     .environment("production")
///     .bootstrap(StaticBootstrap::new(ClientFeatures::new(
///         vec![FeatureDefinition::new("new-checkout", true)],
///         vec![],
///     )))
///     .to_client()
///     .unwrap();
/// ```
pub struct ClientConfig {
    pub(crate) app_name: String,
    pub(crate) environment: String,
    pub(crate) bootstrap: Option<Arc<dyn BootstrapProvider>>,
    pub(crate) bootstrap_override: bool,
    pub(crate) storage: Arc<dyn BackupStore>,
    pub(crate) remote_source: Option<Box<dyn RemoteSource>>,
    pub(crate) poller_config: PollerThreadConfig,
    pub(crate) strategies: Vec<Box<dyn Strategy>>,
    pub(crate) hostname: Option<String>,
}

impl ClientConfig {
    /// Default value for [`ClientConfig::environment`].
    pub const DEFAULT_ENVIRONMENT: &'static str = "default";

    /// Create a default configuration for the application `app_name`.
    ///
    /// ```
    /// # use toggle_engine::ClientConfig;
    /// ClientConfig::new("checkout-service");
    /// ```
    pub fn new(app_name: impl Into<String>) -> ClientConfig {
        ClientConfig {
            app_name: app_name.into(),
            environment: ClientConfig::DEFAULT_ENVIRONMENT.to_owned(),
            bootstrap: None,
            bootstrap_override: true,
            storage: Arc::new(InMemoryStorage::new()),
            remote_source: None,
            poller_config: PollerThreadConfig::default(),
            strategies: Vec::new(),
            hostname: None,
        }
    }

    /// Environment added to every evaluation context.
    pub fn environment(mut self, environment: impl Into<String>) -> ClientConfig {
        self.environment = environment.into();
        self
    }

    /// Read the initial snapshot from `bootstrap` on start.
    pub fn bootstrap(mut self, bootstrap: impl BootstrapProvider + 'static) -> ClientConfig {
        self.bootstrap = Some(Arc::new(bootstrap));
        self
    }

    /// Whether bootstrap data replaces backup data on start. Defaults to `true`.
    pub fn bootstrap_override(mut self, bootstrap_override: bool) -> ClientConfig {
        self.bootstrap_override = bootstrap_override;
        self
    }

    /// Backup store used to load and persist snapshots. Defaults to [`InMemoryStorage`].
    pub fn storage(mut self, storage: impl BackupStore + 'static) -> ClientConfig {
        self.storage = Arc::new(storage);
        self
    }

    /// Poll `source` for fresh snapshots once the client is started.
    ///
    /// ```
    /// # use toggle_engine::{ClientConfig, Result, models::ClientFeatures};
    /// let config = ClientConfig::new("app").remote_source(|| -> Result<Option<ClientFeatures>> {
    ///     Ok(None)
    /// });
    /// ```
    pub fn remote_source(mut self, source: impl RemoteSource + 'static) -> ClientConfig {
        self.remote_source = Some(Box::new(source));
        self
    }

    /// Interval and jitter of remote polling.
    pub fn poller_config(mut self, poller_config: PollerThreadConfig) -> ClientConfig {
        self.poller_config = poller_config;
        self
    }

    /// Register a custom strategy.
    pub fn strategy(mut self, strategy: impl Strategy + 'static) -> ClientConfig {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Hostname matched by the `applicationHostname` strategy instead of the resolved one.
    pub fn hostname(mut self, hostname: impl Into<String>) -> ClientConfig {
        self.hostname = Some(hostname.into());
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// The client is not started. Call [`Client::start`].
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyStrategyName`](crate::Error::EmptyStrategyName) and
    ///   [`Error::DuplicateStrategy`](crate::Error::DuplicateStrategy) for invalid custom
    ///   strategies.
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_name", &self.app_name)
            .field("environment", &self.environment)
            .field("bootstrap", &self.bootstrap.is_some())
            .field("bootstrap_override", &self.bootstrap_override)
            .field("remote_source", &self.remote_source.is_some())
            .field("poller_config", &self.poller_config)
            .field("strategies", &self.strategies.len())
            .finish_non_exhaustive()
    }
}
