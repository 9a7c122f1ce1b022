// Telemetry store - bounded per-metric history shared by ingestion and rendering
use crate::application::error::{IngestError, StoreError};
use crate::domain::metric::MetricCatalog;
use crate::domain::reading::ReadingSet;
use crate::domain::telemetry::{SeriesSnapshot, TimeSeriesBuffer, TimeSeriesPoint};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub ingested: u64,
    pub rejected: u64,
    pub unknown_keys: u64,
    pub sequence_gaps: u64,
    pub last_sequence: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub id: String,
    pub unit: String,
    pub aliases: Vec<String>,
    pub samples: usize,
    pub latest: Option<TimeSeriesPoint>,
}

struct StoreInner {
    time: VecDeque<i64>,
    buffers: HashMap<String, TimeSeriesBuffer>,
    stats: StoreStats,
}

enum SequenceCheck {
    InOrder,
    Gap(u64),
    Restarted { last: u64 },
}

/// Ring buffers for every catalog metric plus the shared tick clock.
///
/// Every mutation and every read takes the same lock for exactly one tick's
/// worth of appends or one buffer copy. Each stored point carries the tick
/// timestamp it arrived with, so a metric that skipped some ticks is never
/// paired with another tick's time.
pub struct TelemetryStore {
    catalog: Arc<MetricCatalog>,
    capacity: usize,
    inner: Mutex<StoreInner>,
}

impl TelemetryStore {
    pub fn new(catalog: Arc<MetricCatalog>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let buffers = catalog
            .iter()
            .map(|m| (m.id.clone(), TimeSeriesBuffer::new(capacity)))
            .collect();

        Self {
            catalog,
            capacity,
            inner: Mutex::new(StoreInner {
                time: VecDeque::with_capacity(capacity),
                buffers,
                stats: StoreStats::default(),
            }),
        }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic mid-append cannot leave a buffer over capacity, so a poisoned
    // lock is still safe to keep using.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ingest one raw message stamped with the current wall clock.
    /// Never fails: malformed input is logged and dropped.
    pub fn ingest(&self, raw: &[u8]) -> bool {
        self.ingest_at(raw, chrono::Utc::now().timestamp_millis())
    }

    pub fn ingest_at(&self, raw: &[u8], now_ms: i64) -> bool {
        match self.try_ingest(raw, now_ms) {
            Ok(appended) => {
                tracing::debug!(appended, "ingested telemetry message");
                true
            }
            Err(e) => {
                self.lock().stats.rejected += 1;
                tracing::warn!(bytes = raw.len(), "dropping telemetry message: {}", e);
                false
            }
        }
    }

    /// Decode and append; returns how many metric buffers received a value
    pub fn try_ingest(&self, raw: &[u8], now_ms: i64) -> Result<usize, IngestError> {
        let set = ReadingSet::decode(raw)?;

        let mut values: HashMap<&str, f64> = HashMap::with_capacity(set.len());
        let mut unknown = 0u64;
        for (key, value) in &set.readings {
            match self.catalog.resolve(key) {
                // Canonical name wins over an alias sent in the same message
                Some(metric) if metric.id == *key => {
                    values.insert(metric.id.as_str(), *value);
                }
                Some(metric) => {
                    values.entry(metric.id.as_str()).or_insert(*value);
                }
                None => {
                    unknown += 1;
                    tracing::debug!(key = %key, "ignoring reading for unknown metric");
                }
            }
        }

        let check = {
            let mut inner = self.lock();

            // Clock steps backwards must not break time ordering
            let time_ms = inner.time.back().map_or(now_ms, |last| now_ms.max(*last));
            if inner.time.len() == self.capacity {
                inner.time.pop_front();
            }
            inner.time.push_back(time_ms);

            for (id, value) in &values {
                if let Some(buffer) = inner.buffers.get_mut(*id) {
                    buffer.push(TimeSeriesPoint::new(time_ms, *value));
                }
            }

            let stats = &mut inner.stats;
            stats.ingested += 1;
            stats.unknown_keys += unknown;
            let check = match (set.sequence, stats.last_sequence) {
                // The sequence is taken from the wire verbatim; seq > last keeps
                // the subtraction in range for any pair of values.
                (Some(seq), Some(last)) if seq > last => match seq - last - 1 {
                    0 => SequenceCheck::InOrder,
                    missed => {
                        stats.sequence_gaps += 1;
                        SequenceCheck::Gap(missed)
                    }
                },
                (Some(_), Some(last)) => SequenceCheck::Restarted { last },
                _ => SequenceCheck::InOrder,
            };
            if set.sequence.is_some() {
                stats.last_sequence = set.sequence;
            }
            check
        };

        match check {
            SequenceCheck::Gap(missed) => {
                tracing::warn!(missed, sequence = ?set.sequence, "telemetry sequence gap")
            }
            SequenceCheck::Restarted { last } => {
                tracing::info!(last, sequence = ?set.sequence, "producer sequence restarted")
            }
            SequenceCheck::InOrder => {}
        }

        Ok(values.len())
    }

    /// Copy of one metric's buffer, oldest first. Each value is paired with
    /// the timestamp of the tick that delivered it, so a metric that skipped
    /// ticks keeps its own times instead of a prefix of the shared time buffer.
    pub fn snapshot(&self, metric: &str) -> Result<SeriesSnapshot, StoreError> {
        let metric = self
            .catalog
            .resolve(metric)
            .ok_or_else(|| StoreError::UnknownMetric(metric.to_string()))?;

        let points = self
            .lock()
            .buffers
            .get(&metric.id)
            .map(TimeSeriesBuffer::to_vec)
            .unwrap_or_default();

        Ok(SeriesSnapshot {
            metric: metric.id.clone(),
            unit: metric.unit.clone(),
            points,
        })
    }

    /// Number of ticks currently held in the shared time buffer
    pub fn tick_count(&self) -> usize {
        self.lock().time.len()
    }

    pub fn stats(&self) -> StoreStats {
        self.lock().stats.clone()
    }

    pub fn summary(&self) -> Vec<MetricSummary> {
        let inner = self.lock();
        self.catalog
            .iter()
            .map(|metric| {
                let buffer = inner.buffers.get(&metric.id);
                MetricSummary {
                    id: metric.id.clone(),
                    unit: metric.unit.clone(),
                    aliases: metric.aliases.clone(),
                    samples: buffer.map_or(0, TimeSeriesBuffer::len),
                    latest: buffer.and_then(|b| b.latest().copied()),
                }
            })
            .collect()
    }
}
