// Telemetry producer - synthesizes one reading set per tick and publishes it
use crate::application::connector::TransportConnector;
use crate::application::error::TransportError;
use crate::domain::metric::MetricCatalog;
use crate::domain::reading::ReadingSet;
use crate::domain::telemetry::Sample;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub topic: String,
    pub interval: Duration,
}

pub struct TelemetryProducer {
    catalog: Arc<MetricCatalog>,
    connector: Arc<TransportConnector>,
    settings: ProducerSettings,
    sequence: AtomicU64,
}

impl TelemetryProducer {
    pub fn new(
        catalog: Arc<MetricCatalog>,
        connector: Arc<TransportConnector>,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            catalog,
            connector,
            settings,
            sequence: AtomicU64::new(0),
        }
    }

    /// Draw one value for every catalog metric
    pub fn sample_readings<R: Rng + ?Sized>(&self, rng: &mut R, now_ms: i64) -> ReadingSet {
        let samples = self
            .catalog
            .iter()
            .map(|metric| Sample::new(metric.id.clone(), metric.rule.sample(rng), now_ms))
            .collect();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        ReadingSet::from_samples(sequence, now_ms, samples)
    }

    /// Sample and publish once. A failed publish is reported, not retried.
    pub async fn tick(&self) -> Result<ReadingSet, TransportError> {
        let set = {
            let mut rng = rand::thread_rng();
            self.sample_readings(&mut rng, chrono::Utc::now().timestamp_millis())
        };

        let payload = set.encode().map_err(|e| TransportError::Publish {
            topic: self.settings.topic.clone(),
            reason: e.to_string(),
        })?;
        self.connector.publish(&self.settings.topic, payload).await?;
        Ok(set)
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            topic = %self.settings.topic,
            interval_ms = self.settings.interval.as_millis() as u64,
            metrics = self.catalog.len(),
            "sensor simulation started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(set) => tracing::debug!(sequence = ?set.sequence, readings = set.len(), "published readings"),
                Err(e) => tracing::warn!("publish failed, skipping tick: {}", e),
            }
        }

        tracing::info!("sensor simulation stopped");
    }
}
