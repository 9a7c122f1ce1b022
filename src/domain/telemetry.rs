// Telemetry data domain models
use serde::Serialize;
use std::collections::VecDeque;

/// One reading of one metric, as produced by the sensor side
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: String,
    pub value: f64,
    pub time_ms: i64,
}

impl Sample {
    pub fn new(metric: impl Into<String>, value: f64, time_ms: i64) -> Self {
        Self {
            metric: metric.into(),
            value,
            time_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Fixed-capacity FIFO of points for a single metric.
///
/// Pushing into a full buffer evicts the oldest point first, so the length
/// never exceeds the capacity.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    points: VecDeque<TimeSeriesPoint>,
    capacity: usize,
}

impl TimeSeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, returning the evicted one if the buffer was full
    pub fn push(&mut self, point: TimeSeriesPoint) -> Option<TimeSeriesPoint> {
        let evicted = if self.points.len() == self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&TimeSeriesPoint> {
        self.points.back()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &TimeSeriesPoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<TimeSeriesPoint> {
        self.points.iter().copied().collect()
    }
}

/// Point-in-time copy of one metric's buffer, safe to hand to a renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub metric: String,
    pub unit: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl SeriesSnapshot {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.time_ms).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}
