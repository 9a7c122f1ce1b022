// MQTT broker client backed by rumqttc
use crate::application::error::TransportError;
use crate::application::transport::{BrokerClient, BrokerEvent, Endpoint, InboundMessage};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const REQUEST_QUEUE: usize = 64;
/// How long `close` keeps driving the event loop to flush DISCONNECT
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// One rumqttc session at a time. `open` builds a fresh client/event-loop
/// pair; reconnect policy belongs to the connector, so a dropped session
/// is surfaced as `BrokerEvent::Disconnected` instead of being retried here.
pub struct MqttBrokerClient {
    client_id: String,
    keep_alive: Duration,
    client: Mutex<Option<AsyncClient>>,
    event_loop: tokio::sync::Mutex<Option<EventLoop>>,
}

impl MqttBrokerClient {
    pub fn new(client_id: impl Into<String>, keep_alive: Duration) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive,
            client: Mutex::new(None),
            event_loop: tokio::sync::Mutex::new(None),
        }
    }

    fn options(&self, endpoint: &Endpoint) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), endpoint.host.clone(), endpoint.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options
    }

    fn current_client(&self) -> Option<AsyncClient> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Poll until the queued DISCONNECT has gone out on the wire, then drop
    /// the event loop (and with it the socket).
    async fn flush_disconnect(&self, queued: bool) {
        let mut guard = self.event_loop.lock().await;
        if let (true, Some(event_loop)) = (queued, guard.as_mut()) {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!("session ended while flushing disconnect: {}", e);
                        break;
                    }
                }
            }
        }
        guard.take();
    }
}

#[async_trait]
impl BrokerClient for MqttBrokerClient {
    async fn open(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let (client, mut event_loop) = AsyncClient::new(self.options(endpoint), REQUEST_QUEUE);

        // rumqttc connects lazily on the first poll; wait for the broker's ack
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => continue,
                Err(e) => {
                    return Err(TransportError::Connection {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        *self.client.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
        *self.event_loop.lock().await = Some(event_loop);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let client = self.current_client().ok_or(TransportError::NotConnected)?;
        client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let client = self.current_client().ok_or(TransportError::NotConnected)?;
        // try_publish never waits on a full request queue
        client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn next_event(&self) -> Result<BrokerEvent, TransportError> {
        let mut guard = self.event_loop.lock().await;
        let event_loop = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(BrokerEvent::Message(InboundMessage::new(
                        publish.topic,
                        publish.payload,
                    )));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    *guard = None;
                    return Ok(BrokerEvent::Disconnected("broker sent disconnect".to_string()));
                }
                Ok(_) => continue,
                Err(e) => {
                    *guard = None;
                    return Ok(BrokerEvent::Disconnected(e.to_string()));
                }
            }
        }
    }

    async fn close(&self) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let queued = match client {
            Some(client) => match client.try_disconnect() {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("disconnect request not queued: {}", e);
                    false
                }
            },
            None => false,
        };

        // The connector cancels its network loop before calling close, so the
        // lock frees up promptly. If the broker never acknowledges the write
        // in time the socket is dropped without a clean DISCONNECT.
        if tokio::time::timeout(CLOSE_GRACE, self.flush_disconnect(queued))
            .await
            .is_err()
        {
            tracing::debug!("disconnect not flushed within {:?}, dropping session", CLOSE_GRACE);
            if let Ok(mut event_loop) = self.event_loop.try_lock() {
                event_loop.take();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const DISCONNECT: [u8; 2] = [0xE0, 0x00];

    #[test]
    fn test_options_follow_settings() {
        let client = MqttBrokerClient::new("hvac-sensor-1", Duration::from_secs(60));
        let options = client.options(&Endpoint::new("broker.local", 1884));

        assert_eq!(options.client_id(), "hvac-sensor-1");
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }

    #[tokio::test]
    async fn test_requires_open_session() {
        let client = MqttBrokerClient::new("hvac-test", Duration::from_secs(5));

        assert!(matches!(
            client.publish("hvac/sensor", b"{}".to_vec()).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(client.subscribe("hvac/sensor").await, Err(TransportError::NotConnected)));
        assert!(matches!(client.next_event().await, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_sends_disconnect_and_drops_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            // CONNECT, answered with a plain accepted CONNACK
            socket.read(&mut buf).await.unwrap();
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let mut seen = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if seen.windows(2).any(|w| w == DISCONNECT) {
                    break;
                }
            }
            seen
        });

        let client = MqttBrokerClient::new("hvac-close-test", Duration::from_secs(30));
        client.open(&Endpoint::new("127.0.0.1", port)).await.unwrap();
        client.close().await;

        let seen = tokio::time::timeout(Duration::from_secs(5), broker)
            .await
            .unwrap()
            .unwrap();
        assert!(seen.windows(2).any(|w| w == DISCONNECT));
        assert!(client.event_loop.try_lock().unwrap().is_none());
        assert!(matches!(
            client.publish("hvac/sensor", b"{}".to_vec()).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_close_without_session_is_noop() {
        let client = MqttBrokerClient::new("hvac-test", Duration::from_secs(5));
        client.close().await;
        assert!(client.event_loop.try_lock().unwrap().is_none());
    }
}
