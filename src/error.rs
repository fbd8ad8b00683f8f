use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Diff retrieval failed: {0}")]
    Diff(#[from] DiffError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// The upstream could not be reached when a listener started.
    #[error("Could not connect: {message}")]
    Connect { message: String },

    /// An established upstream connection failed or was closed.
    #[error("Connection error: {message}")]
    Connection { message: String },
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Reasons a source event cannot be mapped onto the canonical shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("change URL could not be parsed: {0}")]
    InvalidUrl(String),

    #[error("change could not be classified as edit or new (flags {flags:?})")]
    Unclassifiable { flags: String },

    #[error("unsupported change type: {0}")]
    UnsupportedType(String),
}

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("compare request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("could not decode compare response: {body}")]
    Decode { body: String },

    #[error("fetch queue is closed")]
    QueueClosed,
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("could not encode payload for {topic}: {source}")]
    Encode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("subscriber on {topic} lagged by {skipped} messages")]
    Lagged { topic: String, skipped: u64 },

    #[error("topic {0} is closed")]
    Closed(String),
}
