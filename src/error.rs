use std::sync::Arc;

/// Represents a result type for fallible operations of this crate.
///
/// Evaluation itself never fails: malformed data resolves to a disabled decision instead. `Result`
/// is only returned from construction, lifecycle and I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A custom strategy was registered with an empty name.
    #[error("strategy name must not be empty")]
    EmptyStrategyName,

    /// Two strategies (or a custom strategy and a built-in one) share the same name.
    #[error("strategy `{0}` is registered more than once")]
    DuplicateStrategy(String),

    /// A feature was installed with fields of the wrong type. The feature is still installed using
    /// best-effort defaults.
    #[error("invalid feature `{feature}`: {reason}")]
    InvalidFeature {
        /// Name of the offending feature.
        feature: String,
        /// Comma-separated list of shape violations.
        reason: String,
    },

    /// A feature entry could not be parsed at all and was dropped.
    #[error("unparseable feature entry dropped: {0}")]
    UnparseableFeature(String),

    /// The remote source rejected our credentials. This is not recoverable, so the refresh loop
    /// stops.
    #[error("unauthorized, remote source rejected the credentials")]
    Unauthorized,

    /// The remote source failed to produce a snapshot.
    #[error("remote fetch failed: {0}")]
    Remote(String),

    /// Indicates that the poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,

    /// The client was used after `destroy()`.
    #[error("client has been destroyed")]
    Destroyed,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Json(Arc<serde_json::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}
