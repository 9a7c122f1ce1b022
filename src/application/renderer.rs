// Renderer seam - the only call the pipeline makes into plotting code
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    NothingSelected,
    NoSamples,
    MetricUnavailable,
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NoDataReason::NothingSelected => "no metric selected",
            NoDataReason::NoSamples => "no samples received yet",
            NoDataReason::MetricUnavailable => "metric unavailable",
        };
        f.write_str(text)
    }
}

/// Rendering is treated as infallible by the pipeline; failures are the
/// implementor's concern.
pub trait Renderer: Send + Sync {
    fn render(&self, label: &str, timestamps: &[i64], values: &[f64]);

    fn render_empty(&self, reason: NoDataReason);
}

#[cfg(test)]
pub mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Rendered {
        Series {
            label: String,
            timestamps: Vec<i64>,
            values: Vec<f64>,
        },
        Empty(NoDataReason),
    }

    #[derive(Default)]
    pub struct RecordingRenderer {
        calls: Mutex<Vec<Rendered>>,
    }

    impl RecordingRenderer {
        pub fn calls(&self) -> Vec<Rendered> {
            self.calls.lock().unwrap().clone()
        }

        pub fn last(&self) -> Option<Rendered> {
            self.calls.lock().unwrap().last().cloned()
        }
    }

    impl Renderer for RecordingRenderer {
        fn render(&self, label: &str, timestamps: &[i64], values: &[f64]) {
            self.calls.lock().unwrap().push(Rendered::Series {
                label: label.to_string(),
                timestamps: timestamps.to_vec(),
                values: values.to_vec(),
            });
        }

        fn render_empty(&self, reason: NoDataReason) {
            self.calls.lock().unwrap().push(Rendered::Empty(reason));
        }
    }
}
