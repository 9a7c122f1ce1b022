// Transport connector - owns one logical broker session and keeps it alive
use crate::application::error::TransportError;
use crate::application::transport::{BrokerClient, BrokerEvent, Endpoint, InboundMessage, topic_matches};
use crate::domain::connection::ConnectionState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub endpoint: Endpoint,
    pub retry_delay: Duration,
    pub inbound_queue: usize,
}

struct Subscription {
    filter: String,
    tx: mpsc::Sender<InboundMessage>,
}

/// Connects with a fixed-delay retry that never gives up, re-enters that
/// loop whenever the session drops, and hands inbound messages to bounded
/// per-subscription queues.
///
/// Messages that arrive while the session is down are simply lost; nothing
/// is replayed after a reconnect.
pub struct TransportConnector {
    client: Arc<dyn BrokerClient>,
    settings: ConnectorSettings,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    subscriptions: Mutex<Vec<Subscription>>,
    dropped: AtomicU64,
    shutdown: CancellationToken,
}

impl TransportConnector {
    pub fn new(client: Arc<dyn BrokerClient>, settings: ConnectorSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(32);
        Self {
            client,
            settings,
            state,
            transitions,
            subscriptions: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Every state change from now on, in order
    #[cfg(test)]
    pub fn watch_transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    /// Inbound messages discarded because a subscriber's queue was full
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.settings.endpoint
    }

    /// Once the connector is closed only `Disconnected` is accepted. The
    /// cancellation check runs under the watch lock so it cannot interleave
    /// with the final transition made by `close`.
    fn set_state(&self, next: ConnectionState) {
        let mut previous = next;
        let changed = self.state.send_if_modified(|current| {
            if next != ConnectionState::Disconnected && self.shutdown.is_cancelled() {
                return false;
            }
            previous = std::mem::replace(current, next);
            previous != next
        });
        if changed {
            let _ = self.transitions.send(next);
            tracing::info!(from = %previous, to = %next, endpoint = %self.settings.endpoint, "connection state changed");
        }
    }

    /// Block until a session is established. Retries forever with a fixed
    /// delay; only returns an error once the connector has been closed.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut attempt: u64 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return Err(TransportError::Closed);
            }

            attempt += 1;
            self.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(TransportError::Closed),
                opened = self.client.open(&self.settings.endpoint) => opened,
            };

            match opened {
                Ok(()) => {
                    if self.shutdown.is_cancelled() {
                        // close() may have run while the session was being
                        // established; release what the open just acquired.
                        self.client.close().await;
                        self.set_state(ConnectionState::Disconnected);
                        return Err(TransportError::Closed);
                    }
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(attempt, endpoint = %self.settings.endpoint, "connected to broker");
                    self.resubscribe().await;
                    return Ok(());
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::warn!(
                        attempt,
                        retry_in_ms = self.settings.retry_delay.as_millis() as u64,
                        "connection failed: {}",
                        e
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Err(TransportError::Closed),
                        _ = tokio::time::sleep(self.settings.retry_delay) => {}
                    }
                }
            }
        }
    }

    /// Register interest in a topic filter. The subscription survives
    /// reconnects; the returned queue closes when the connector is dropped.
    pub async fn subscribe(&self, filter: &str) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(self.settings.inbound_queue.max(1));
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription {
                filter: filter.to_string(),
                tx,
            });

        if self.state() == ConnectionState::Connected {
            if let Err(e) = self.client.subscribe(filter).await {
                tracing::warn!(topic = filter, "subscribe failed, will retry on reconnect: {}", e);
            }
        }
        rx
    }

    async fn resubscribe(&self) {
        let filters: Vec<String> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.filter.clone())
            .collect();

        for filter in filters {
            match self.client.subscribe(&filter).await {
                Ok(()) => tracing::info!(topic = %filter, "subscribed"),
                Err(e) => tracing::warn!(topic = %filter, "subscribe failed: {}", e),
            }
        }
    }

    /// Send one message, at most once. Failures are returned, never retried.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.client.publish(topic, payload).await
    }

    fn dispatch(&self, message: InboundMessage) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        subscriptions.retain(|sub| {
            if !topic_matches(&sub.filter, &message.topic) {
                return true;
            }
            match sub.tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(topic = %message.topic, "inbound queue full, dropping message");
                    true
                }
                // Receiver gone, nobody to deliver to any more
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Network loop: keeps the session up and pumps inbound events until
    /// `close` is called.
    pub async fn run(&self) -> Result<(), TransportError> {
        loop {
            if self.state() != ConnectionState::Connected {
                match self.connect().await {
                    Ok(()) => {}
                    Err(TransportError::Closed) => break,
                    Err(e) => return Err(e),
                }
            }

            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.client.next_event() => event,
            };

            match event {
                Ok(BrokerEvent::Message(message)) => self.dispatch(message),
                Ok(BrokerEvent::Disconnected(reason)) => {
                    tracing::warn!(%reason, "broker session dropped, reconnecting");
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(e) => {
                    tracing::warn!("broker session error, reconnecting: {}", e);
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }

        tracing::debug!("connector loop stopped");
        Ok(())
    }

    /// Stop the network loop and release the session regardless of state
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.client.close().await;
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(endpoint = %self.settings.endpoint, "transport closed");
    }
}
