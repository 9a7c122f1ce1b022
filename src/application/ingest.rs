// Ingestion worker - drains the connector's inbound queue into the store
use crate::application::store::TelemetryStore;
use crate::application::transport::InboundMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs until shutdown or until the queue's sender side goes away.
/// Returns the number of messages that were stored.
pub async fn run_ingestion(
    store: Arc<TelemetryStore>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    shutdown: CancellationToken,
) -> u64 {
    let mut stored = 0u64;

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        if store.ingest(&message.payload) {
            stored += 1;
        } else {
            tracing::debug!(topic = %message.topic, "message rejected by store");
        }
    }

    tracing::info!(stored, "ingestion stopped");
    stored
}
