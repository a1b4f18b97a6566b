//! The repository owns the active snapshot and decides which source may replace it.
//!
//! Sources, in order of authority:
//! 1. remote source (through the [`PollerThread`]). Once a remote snapshot is installed, the
//!    repository is *connected* and the other sources are ignored.
//! 2. bootstrap provider. Installed if the repository is not ready yet, or always when
//!    `bootstrap_override` is set (the default).
//! 3. backup store. Installed only if the repository is not ready yet.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use crate::{
    bootstrap::BootstrapProvider,
    events::{Event, EventBus, EventListener},
    models::{ClientFeatures, Snapshot},
    poller_thread::{PollerThread, PollerThreadConfig, RemoteSource},
    snapshot_store::SnapshotStore,
    storage::{BackupStore, InMemoryStorage},
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Backup,
    Bootstrap,
    Remote,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Source::Backup => "backup",
            Source::Bootstrap => "bootstrap",
            Source::Remote => "remote",
        }
    }
}

#[derive(Debug, Default)]
struct State {
    started: bool,
    ready: bool,
    connected: bool,
    stopped: bool,
}

/// Holder of the active [`Snapshot`] and emitter of lifecycle [`Event`]s.
///
/// Installs are serialized, so listeners observe `ready` and `changed` events in installation
/// order. Evaluation reads the snapshot without taking any of the repository's locks beyond a
/// short read lock to clone an `Arc`.
pub struct Repository {
    app_name: String,
    bootstrap: Option<Arc<dyn BootstrapProvider>>,
    bootstrap_override: bool,
    storage: Arc<dyn BackupStore>,
    store: SnapshotStore,
    /// Mirrors `State::ready` for the evaluation path.
    ready: AtomicBool,
    state: Mutex<State>,
    ready_signal: Condvar,
    /// Serializes install + emit.
    install_lock: Mutex<()>,
    events: EventBus,
    poller: Mutex<Option<PollerThread>>,
}

impl Repository {
    /// Create a repository for `app_name` with an in-memory backup store and no bootstrap.
    pub fn new(app_name: impl Into<String>) -> Repository {
        Repository {
            app_name: app_name.into(),
            bootstrap: None,
            bootstrap_override: true,
            storage: Arc::new(InMemoryStorage::new()),
            store: SnapshotStore::new(),
            ready: AtomicBool::new(false),
            state: Mutex::new(State::default()),
            ready_signal: Condvar::new(),
            install_lock: Mutex::new(()),
            events: EventBus::new(),
            poller: Mutex::new(None),
        }
    }

    /// Use `storage` to load and persist backups.
    pub fn with_storage(mut self, storage: Arc<dyn BackupStore>) -> Repository {
        self.storage = storage;
        self
    }

    /// Read the initial snapshot from `bootstrap` on start.
    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn BootstrapProvider>) -> Repository {
        self.bootstrap = Some(bootstrap);
        self
    }

    /// Whether bootstrap data replaces backup data loaded on start. Defaults to `true`.
    pub fn with_bootstrap_override(mut self, bootstrap_override: bool) -> Repository {
        self.bootstrap_override = bootstrap_override;
        self
    }

    /// Application name, used as the backup key.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Load the backup and the bootstrap snapshot.
    ///
    /// Both are read concurrently and applied in a fixed order: backup first, then bootstrap.
    /// Read failures are reported as `warn` events. Calling `start` more than once, or after
    /// [`Repository::stop`], does nothing.
    pub fn start(&self) {
        {
            let mut state = self.lock_state();
            if state.started || state.stopped {
                return;
            }
            state.started = true;
        }

        let (backup, bootstrap) = std::thread::scope(|scope| {
            let backup = scope.spawn(|| self.storage.get(&self.app_name));
            let bootstrap = self
                .bootstrap
                .as_ref()
                .map(|provider| provider.read_bootstrap());
            let backup = backup
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("backup read panicked").into()));
            (backup, bootstrap)
        });

        match backup {
            Ok(Some(snapshot)) if !snapshot.is_empty() => {
                self.install(Source::Backup, ClientFeatures::from(snapshot));
            }
            Ok(_) => {
                log::debug!(target: "toggle_engine",
                            app_name = self.app_name.as_str();
                            "no backup found");
            }
            Err(err) => self.warn(format!("failed to read backup: {err}")),
        }

        match bootstrap {
            Some(Ok(Some(features))) if !features.is_empty() => {
                self.install(Source::Bootstrap, features);
            }
            Some(Ok(_)) | None => {}
            Some(Err(err)) => self.warn(format!("failed to read bootstrap: {err}")),
        }
    }

    /// Start polling `source` in the background.
    ///
    /// # Errors
    ///
    /// - [`Error::Destroyed`] if the repository has been stopped.
    /// - [`Error::Io`] if the poller thread could not be spawned.
    pub fn start_polling(
        self: &Arc<Self>,
        source: Box<dyn RemoteSource>,
        config: PollerThreadConfig,
    ) -> Result<()> {
        if self.lock_state().stopped {
            return Err(Error::Destroyed);
        }
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = poller.take() {
            previous.stop();
        }
        *poller = Some(PollerThread::start(source, Arc::clone(self), config)?);
        Ok(())
    }

    /// Install a snapshot received from the remote source.
    ///
    /// Always wins over backup and bootstrap data and marks the repository as connected. Ignored
    /// after [`Repository::stop`].
    pub fn install_remote(&self, features: ClientFeatures) -> bool {
        self.install(Source::Remote, features)
    }

    fn install(&self, source: Source, features: ClientFeatures) -> bool {
        let _guard = self
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        {
            let state = self.lock_state();
            let accepted = match source {
                _ if state.stopped => false,
                Source::Remote => true,
                _ if state.connected => false,
                Source::Bootstrap => !state.ready || self.bootstrap_override,
                Source::Backup => !state.ready,
            };
            if !accepted {
                log::debug!(target: "toggle_engine",
                            source = source.as_str();
                            "ignoring snapshot");
                return false;
            }
        }

        let (snapshot, problems) = features.into_snapshot();
        for problem in problems {
            log::warn!(target: "toggle_engine",
                       source = source.as_str();
                       "{problem}");
            self.events.emit(Event::Error(problem));
        }

        let snapshot = Arc::new(snapshot);
        self.store.set_snapshot(Arc::clone(&snapshot));

        if source != Source::Backup {
            if let Err(err) = self.storage.set(&self.app_name, &snapshot) {
                self.warn(format!("failed to persist backup: {err}"));
            }
        }

        let first = {
            let mut state = self.lock_state();
            let first = !state.ready;
            state.ready = true;
            self.ready.store(true, Ordering::Release);
            if source == Source::Remote {
                state.connected = true;
            }
            first
        };
        self.ready_signal.notify_all();

        log::debug!(target: "toggle_engine",
                    source = source.as_str(),
                    features = snapshot.features.len();
                    "installed snapshot");

        if first {
            self.events.emit(Event::Ready);
        }
        self.events.emit(Event::Changed(snapshot));
        true
    }

    /// Report a recoverable problem as a `warn` event.
    pub fn warn(&self, message: String) {
        log::warn!(target: "toggle_engine", "{message}");
        self.events.emit(Event::Warn(message));
    }

    /// Report a problem as an `error` event.
    pub(crate) fn error(&self, error: Error) {
        log::error!(target: "toggle_engine", "{error}");
        self.events.emit(Event::Error(error));
    }

    /// The active snapshot. Empty until the repository is ready.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.get_snapshot()
    }

    /// `true` once any data has been installed. Does not take any lock.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// `true` once a remote snapshot has been installed.
    pub fn is_connected(&self) -> bool {
        self.lock_state().connected
    }

    /// Block until the repository is ready, `timeout` elapses or the repository is stopped.
    /// Returns readiness.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        while !state.ready && !state.stopped {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            state = self
                .ready_signal
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.ready
    }

    /// Register a listener for lifecycle events. Ignored after [`Repository::stop`].
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.events.subscribe(listener);
    }

    /// Stop polling, detach all listeners and refuse any further installs.
    ///
    /// Idempotent. After `stop` returns, no event is emitted and the snapshot does not change.
    /// Must not be called from an event listener.
    pub fn stop(&self) {
        {
            let mut state = self.lock_state();
            if state.stopped {
                return;
            }
            state.stopped = true;
        }
        self.ready_signal.notify_all();

        // Wait for an in-flight install to finish so nothing is emitted after we return.
        drop(
            self.install_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.events.close();

        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller {
            if let Err(err) = poller.shutdown() {
                log::warn!(target: "toggle_engine", "{err}");
            }
        }
        log::debug!(target: "toggle_engine",
                    app_name = self.app_name.as_str();
                    "repository stopped");
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("app_name", &self.app_name)
            .field("bootstrap_override", &self.bootstrap_override)
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}
