//! A background poller thread that periodically requests a snapshot from a remote source and
//! installs it into the repository.
use std::{
    sync::{mpsc::RecvTimeoutError, Arc},
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{models::ClientFeatures, repository::Repository, Error, Result};

/// Where fresh snapshots come from.
///
/// The transport is up to the implementation. Return `Ok(None)` if the source has nothing new
/// since the previous call; the current snapshot is kept. Return [`Error::Unauthorized`] to stop
/// polling for good. Any other error is reported as a warning and retried on the next tick.
pub trait RemoteSource: Send {
    /// Fetch the full current snapshot.
    fn fetch(&mut self) -> Result<Option<ClientFeatures>>;
}

impl<T: FnMut() -> Result<Option<ClientFeatures>> + Send> RemoteSource for T {
    fn fetch(&mut self) -> Result<Option<ClientFeatures>> {
        self()
    }
}

/// How often [`PollerThread`] asks its [`RemoteSource`] for a new snapshot.
#[derive(Debug, Clone)]
pub struct PollerThreadConfig {
    /// Upper bound of the pause between two fetches.
    pub refresh_interval: Duration,
    /// Random amount, up to this value, taken off every pause so that many processes started
    /// together drift apart.
    pub refresh_jitter: Duration,
}

impl PollerThreadConfig {
    /// Pause used unless [`PollerThreadConfig::with_interval`] is called.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
    /// Jitter used unless [`PollerThreadConfig::with_jitter`] is called.
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(1);

    /// Defaults: 15 s interval, 1 s jitter.
    pub fn new() -> PollerThreadConfig {
        PollerThreadConfig::default()
    }

    #[allow(missing_docs)]
    pub fn with_interval(mut self, refresh_interval: Duration) -> PollerThreadConfig {
        self.refresh_interval = refresh_interval;
        self
    }

    #[allow(missing_docs)]
    pub fn with_jitter(mut self, refresh_jitter: Duration) -> PollerThreadConfig {
        self.refresh_jitter = refresh_jitter;
        self
    }

    fn next_pause(&self) -> Duration {
        jitter(self.refresh_interval, self.refresh_jitter)
    }
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            refresh_interval: Self::DEFAULT_POLL_INTERVAL,
            refresh_jitter: Self::DEFAULT_POLL_JITTER,
        }
    }
}

/// A snapshot poller thread.
///
/// Fetches once immediately and then on every tick. Fetch failures never stop the loop, except
/// for [`Error::Unauthorized`]. Outcomes reach callers through the repository: installs, `warn`
/// events for failed fetches and an `error` event if the source panics.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,
    stop_sender: std::sync::mpsc::SyncSender<()>,
}

impl PollerThread {
    /// Starts the poller thread with the provided configuration.
    ///
    /// # Errors
    ///
    /// - [`std::io::Error`] if the thread could not be spawned.
    pub fn start(
        mut source: Box<dyn RemoteSource>,
        repository: Arc<Repository>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread> {
        // `sync_channel` makes `stop_sender` `Sync`. A buffer of one is enough: `stop()` uses
        // `try_send()` and a full buffer means a stop command is already pending.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name("toggle-poller".to_owned())
            .spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loop {
                    log::debug!(target: "toggle_engine", "fetching snapshot");
                    match source.fetch() {
                        Ok(Some(features)) => {
                            repository.install_remote(features);
                        }
                        Ok(None) => {
                            log::debug!(target: "toggle_engine", "snapshot not modified");
                        }
                        Err(Error::Unauthorized) => {
                            repository.warn(Error::Unauthorized.to_string());
                            return;
                        }
                        Err(err) => {
                            repository.warn(format!("failed to fetch snapshot: {err}"));
                        }
                    }

                    match stop_receiver.recv_timeout(config.next_pause()) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            log::debug!(target: "toggle_engine", "poller stopping");
                            return;
                        }
                    }
                }));

                if outcome.is_err() {
                    repository.error(Error::PollerThreadPanicked);
                }
            })?;

        Ok(PollerThread {
            join_handle,
            stop_sender,
        })
    }

    /// Ask the thread to exit after its current fetch. Returns immediately.
    pub fn stop(&self) {
        // Either the thread has exited already or a stop command is pending. Both are fine.
        let _ = self.stop_sender.try_send(());
    }

    /// Ask the thread to exit and join it.
    ///
    /// When called from the poller thread itself (e.g. from an event listener), this only sends
    /// the stop command.
    ///
    /// # Errors
    ///
    /// - [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        if self.join_handle.thread().id() == std::thread::current().id() {
            return Ok(());
        }

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

impl std::fmt::Debug for PollerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerThread")
            .field("thread", &self.join_handle.thread().name())
            .finish()
    }
}

/// `interval` minus a random amount in `[0, jitter]`, floored at zero.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    let reduction = thread_rng().gen_range(Duration::ZERO..=jitter);
    interval.saturating_sub(reduction)
}
