// Frame renderer - turns refresh output into chart frames for HTTP clients
use crate::application::renderer::{NoDataReason, Renderer};
use chrono::{Local, TimeZone};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Series {
        title: String,
        label: String,
        timestamps: Vec<i64>,
        time_labels: Vec<String>,
        values: Vec<f64>,
    },
    Empty {
        title: String,
        reason: NoDataReason,
    },
}

impl Frame {
    pub fn empty(reason: NoDataReason) -> Self {
        Frame::Empty {
            title: "No Data Available".to_string(),
            reason,
        }
    }
}

fn time_label(time_ms: i64) -> String {
    Local
        .timestamp_millis_opt(time_ms)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Holds the most recent frame; subscribers see each distinct frame once
pub struct FrameRenderer {
    frames: watch::Sender<Frame>,
}

impl FrameRenderer {
    pub fn new() -> Self {
        let (frames, _) = watch::channel(Frame::empty(NoDataReason::NothingSelected));
        Self { frames }
    }

    pub fn subscribe(&self) -> watch::Receiver<Frame> {
        self.frames.subscribe()
    }

    #[cfg(test)]
    pub fn current(&self) -> Frame {
        self.frames.borrow().clone()
    }

    fn publish(&self, frame: Frame) {
        self.frames.send_if_modified(|current| {
            if *current == frame {
                return false;
            }
            *current = frame;
            true
        });
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for FrameRenderer {
    fn render(&self, label: &str, timestamps: &[i64], values: &[f64]) {
        self.publish(Frame::Series {
            title: format!("Live HVAC Sensor Data: {}", label),
            label: label.to_string(),
            timestamps: timestamps.to_vec(),
            time_labels: timestamps.iter().copied().map(time_label).collect(),
            values: values.to_vec(),
        });
    }

    fn render_empty(&self, reason: NoDataReason) {
        self.publish(Frame::empty(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_series_frame() {
        let renderer = FrameRenderer::new();
        renderer.render("Temp (T)", &[1_700_000_000_000, 1_700_000_002_000], &[21.5, 22.0]);

        match renderer.current() {
            Frame::Series { title, time_labels, values, .. } => {
                assert_eq!(title, "Live HVAC Sensor Data: Temp (T)");
                assert_eq!(time_labels.len(), 2);
                assert_eq!(time_labels[0].len(), "HH:MM:SS".len());
                assert_eq!(values, vec![21.5, 22.0]);
            }
            other => panic!("expected series frame, got {other:?}"),
        }
    }

    #[test]
    fn test_identical_frames_notify_once() {
        let renderer = FrameRenderer::new();
        let mut rx = renderer.subscribe();

        renderer.render_empty(NoDataReason::NothingSelected);
        assert!(!rx.has_changed().unwrap());

        renderer.render_empty(NoDataReason::NoSamples);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Frame::empty(NoDataReason::NoSamples));
    }

    #[test]
    fn test_empty_frame_serializes_reason() {
        let json = serde_json::to_value(Frame::empty(NoDataReason::NoSamples)).unwrap();
        assert_eq!(json["kind"], "empty");
        assert_eq!(json["reason"], "no_samples");
    }
}
