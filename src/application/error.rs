// Error taxonomy for the telemetry pipeline
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker unreachable at {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("no active broker session")]
    NotConnected,

    #[error("connector closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed telemetry payload: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("cannot select unknown metric '{0}'")]
    UnknownMetric(String),
}
