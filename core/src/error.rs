use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("invalid harvest interval: {0}")]
    InvalidInterval(String),

    #[error("a harvest of '{target}' is already running (job {job_id})")]
    AlreadyRunning { target: String, job_id: String },

    #[error("harvest fetch from {url} failed: {details}")]
    HarvestFetch { url: String, details: String },

    #[error("record sink error: {0}")]
    Sink(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("harvest cancelled by shutdown signal")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::HarvestFetch { .. } | Error::Sink(_) | Error::Http(_) | Error::Io(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::UnknownTarget(_) | Error::InvalidInterval(_)
        )
    }
}
