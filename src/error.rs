use std::sync::Arc;

/// Represents a result type for operations in this crate.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// crate-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur while loading or evaluating experiments.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The bucketing argument is absent from the call's inputs (or is nil/empty). This is an
    /// expected condition for traffic that has no identifier yet (e.g., logged-out users);
    /// callers should typically log rather than alert.
    #[error("experiment {experiment_name:?} requires an {bucket_val:?} argument")]
    MissingBucketKey {
        /// Name of the experiment that was being evaluated.
        experiment_name: String,
        /// The argument key the experiment buckets on.
        bucket_val: String,
    },

    /// The requested experiment is not present in the current document.
    #[error("experiment {0:?} not found")]
    UnknownExperiment(String),

    /// The experiment's lifecycle type is not recognized. Unrecognized types fail closed rather
    /// than silently no-op.
    #[error("unknown experiment type {0:?}")]
    UnknownExperimentType(String),

    /// A variant set's shape invariants were violated at construction (wrong variant count,
    /// sizes out of range, or total allocation exceeding the bucket space).
    #[error("invalid variant configuration: {0}")]
    InvalidVariantConfiguration(String),

    /// A targeting predicate document is malformed for a recognized operator (wrong arity or
    /// node shape).
    #[error("malformed targeting node: {0}")]
    TargetingNode(String),

    /// A targeting predicate document uses an operator name outside the known set. Kept distinct
    /// from [`Error::TargetingNode`] so callers may treat unrecognized future operators as
    /// non-fatal during rollout.
    #[error("unknown targeting operator {0:?}")]
    UnknownTargetingOperator(String),

    /// The bucketing argument is present but not a string.
    #[error("expected a string for {bucket_val:?}, got {found}")]
    BucketValueType {
        /// The argument key the experiment buckets on.
        bucket_val: String,
        /// Name of the runtime type that was actually supplied.
        found: &'static str,
    },

    /// The experiment entry was present in the manifest but failed to parse. Other experiments
    /// in the same document remain usable.
    #[error("experiment {0:?} failed to parse")]
    ExperimentParse(String),

    /// The manifest file failed to parse as a document.
    #[error("failed to parse manifest {path:?}")]
    ManifestParse {
        /// Path of the manifest file.
        path: String,
        /// The underlying decode error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// Timed out waiting for the initial document load.
    #[error("timed out waiting for initial document load")]
    InitialLoadTimeout,

    /// Indicates that the poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Return `true` if the error is a normal running condition that callers usually handle
    /// silently (as opposed to a configuration or usage problem).
    pub fn is_normal(&self) -> bool {
        matches!(self, Error::MissingBucketKey { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}
