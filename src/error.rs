use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeedTestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to get probes: {0}")]
    ProbeList(String),

    #[error("bad status: {status}, body: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("latency unavailable")]
    NoLatency,

    #[error("speed test cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpeedTestError>;
