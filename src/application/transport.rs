// Transport trait for broker access
use crate::application::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Where the broker lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Message(InboundMessage),
    /// The session dropped; a new `open` is required before anything else works
    Disconnected(String),
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Establish a fresh session, replacing any previous one
    async fn open(&self, endpoint: &Endpoint) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Fire-and-forget publish on the current session
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Wait for the next thing the broker session reports.
    /// Drives the session's network I/O, so must be polled continuously.
    async fn next_event(&self) -> Result<BrokerEvent, TransportError>;

    async fn close(&self);
}

/// MQTT topic filter match with `+` (one level) and `#` (remaining levels)
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
