// Refresh scheduler - periodically hands the selected metric to the renderer
use crate::application::error::SelectionError;
use crate::application::renderer::{NoDataReason, Renderer};
use crate::application::store::TelemetryStore;
use crate::domain::selection::SelectionState;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Rendered { metric: String, samples: usize },
    Empty(NoDataReason),
}

pub struct RefreshScheduler {
    store: Arc<TelemetryStore>,
    renderer: Arc<dyn Renderer>,
    selection: Mutex<SelectionState>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(store: Arc<TelemetryStore>, renderer: Arc<dyn Renderer>, interval: Duration) -> Self {
        Self {
            store,
            renderer,
            selection: Mutex::new(SelectionState::Unselected),
            interval,
        }
    }

    pub fn selection(&self) -> SelectionState {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Toggle selection of `metric`. Unknown metrics leave the state as is.
    pub fn select(&self, metric: &str) -> Result<SelectionState, SelectionError> {
        let Some(resolved) = self.store.catalog().resolve(metric) else {
            tracing::warn!(metric, "ignoring selection of unknown metric");
            return Err(SelectionError::UnknownMetric(metric.to_string()));
        };

        let mut selection = self.selection.lock().unwrap_or_else(PoisonError::into_inner);
        *selection = selection.toggle(&resolved.id);
        tracing::info!(selection = ?*selection, "selection changed");
        Ok(selection.clone())
    }

    pub fn deselect(&self) -> SelectionState {
        let mut selection = self.selection.lock().unwrap_or_else(PoisonError::into_inner);
        *selection = SelectionState::Unselected;
        selection.clone()
    }

    /// One refresh: snapshot the selected metric and forward it, or forward
    /// an explicit "no data" signal.
    pub fn tick(&self) -> RefreshOutcome {
        let outcome = self.refresh();
        if let RefreshOutcome::Empty(reason) = &outcome {
            self.renderer.render_empty(*reason);
        }
        outcome
    }

    fn refresh(&self) -> RefreshOutcome {
        let selection = self.selection();
        let Some(metric) = selection.selected() else {
            return RefreshOutcome::Empty(NoDataReason::NothingSelected);
        };

        match self.store.snapshot(metric) {
            Ok(snapshot) if snapshot.is_empty() => RefreshOutcome::Empty(NoDataReason::NoSamples),
            Ok(snapshot) => {
                self.renderer
                    .render(&snapshot.metric, &snapshot.timestamps(), &snapshot.values());
                RefreshOutcome::Rendered {
                    metric: snapshot.metric,
                    samples: snapshot.points.len(),
                }
            }
            Err(e) => {
                tracing::warn!(metric, "snapshot failed, rendering no data: {}", e);
                RefreshOutcome::Empty(NoDataReason::MetricUnavailable)
            }
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick() {
                RefreshOutcome::Rendered { metric, samples } => {
                    tracing::trace!(%metric, samples, "refreshed")
                }
                RefreshOutcome::Empty(reason) => tracing::trace!(%reason, "refreshed without data"),
            }
        }

        tracing::debug!("refresh loop stopped");
    }
}
