//! Error taxonomy for the reminder engine.

/// Errors surfaced by the scheduling engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The adapter refused to arm because notification permission is not granted.
    #[error("notification permission denied")]
    PermissionDenied,

    /// The platform has no usable notification capability.
    #[error("notification adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// Pending intakes could not be read.
    #[error("intake query failed: {0}")]
    Query(String),

    /// The dedup cache could not be written to durable storage.
    #[error("failed to persist reminder cache: {0}")]
    CachePersist(#[source] Box<Error>),

    /// A single intake could not be turned into reminder windows.
    #[error("cannot compile reminders for intake {intake_id}: {reason}")]
    Compile { intake_id: String, reason: String },

    /// Durable storage I/O failed for `key`.
    #[error("storage error on '{key}': {source}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The host notifier failed to display an alert.
    #[error("notifier failed: {0}")]
    Notifier(String),

    #[error("invalid timezone: {0}")]
    Timezone(String),
}

pub type Result<T> = std::result::Result<T, Error>;
