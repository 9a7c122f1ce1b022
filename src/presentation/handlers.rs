// HTTP request handlers
use crate::application::error::SelectionError;
use crate::application::store::{MetricSummary, StoreStats};
use crate::domain::connection::ConnectionState;
use crate::domain::selection::SelectionState;
use crate::infrastructure::chunked_json::{ndjson_response, stream_from_watch};
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub connection: ConnectionState,
    pub endpoint: String,
    pub dropped_messages: u64,
    pub ticks: usize,
    pub capacity: usize,
    pub store: StoreStats,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Catalog with buffered sample counts and latest values
pub async fn list_metrics(State(state): State<Arc<AppState>>) -> Json<Vec<MetricSummary>> {
    Json(state.store.summary())
}

pub async fn get_selection(State(state): State<Arc<AppState>>) -> Json<SelectionState> {
    Json(state.scheduler.selection())
}

/// Toggle a metric; the frame is refreshed right away instead of on the next tick
pub async fn toggle_selection(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SelectionState>, (StatusCode, String)> {
    match state.scheduler.select(&metric) {
        Ok(selection) => {
            state.scheduler.tick();
            Ok(Json(selection))
        }
        Err(e @ SelectionError::UnknownMetric(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
    }
}

pub async fn clear_selection(State(state): State<Arc<AppState>>) -> Json<SelectionState> {
    let selection = state.scheduler.deselect();
    state.scheduler.tick();
    Json(selection)
}

/// Most recent frame handed to the renderer
pub async fn latest_frame(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let frame = state.frames.borrow().clone();
    match json_response(&frame, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Chunked stream of frames as they change
pub async fn stream_frames(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stream = stream_from_watch(state.frames.clone(), state.shutdown.clone());
    match ndjson_response(stream) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    Json(StatusView {
        connection: state.connector.state(),
        endpoint: state.connector.endpoint().to_string(),
        dropped_messages: state.connector.dropped_messages(),
        ticks: state.store.tick_count(),
        capacity: state.store.capacity(),
        store: state.store.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connector::{ConnectorSettings, TransportConnector};
    use crate::application::scheduler::RefreshScheduler;
    use crate::application::store::TelemetryStore;
    use crate::application::transport::Endpoint;
    use crate::application::transport::scripted::ScriptedClient;
    use crate::domain::metric::MetricCatalog;
    use crate::presentation::frames::{Frame, FrameRenderer};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn app_state() -> Arc<AppState> {
        let store = Arc::new(TelemetryStore::new(Arc::new(MetricCatalog::hvac()), 50));
        let renderer = Arc::new(FrameRenderer::new());
        let frames = renderer.subscribe();
        let scheduler = Arc::new(RefreshScheduler::new(
            store.clone(),
            renderer,
            Duration::from_secs(1),
        ));
        let connector = Arc::new(TransportConnector::new(
            Arc::new(ScriptedClient::new()),
            ConnectorSettings {
                endpoint: Endpoint::new("broker.test", 1883),
                retry_delay: Duration::from_secs(5),
                inbound_queue: 8,
            },
        ));

        Arc::new(AppState {
            store,
            scheduler,
            connector,
            frames,
            shutdown: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "ok");
    }

    #[tokio::test]
    async fn test_toggle_selection_refreshes_frame() {
        let state = app_state();
        state.store.ingest_at(br#"{"Power (P)": 1234.5}"#, 1_000);

        let Json(selection) = toggle_selection(Path("Power (P)".to_string()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(selection, SelectionState::Selected("Power (P)".to_string()));

        match state.frames.borrow().clone() {
            Frame::Series { label, values, .. } => {
                assert_eq!(label, "Power (P)");
                assert_eq!(values, vec![1234.5]);
            }
            other => panic!("expected series frame, got {other:?}"),
        }

        let Json(selection) = toggle_selection(Path("Power (P)".to_string()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(selection, SelectionState::Unselected);
        assert!(matches!(state.frames.borrow().clone(), Frame::Empty { .. }));
    }

    #[tokio::test]
    async fn test_toggle_unknown_metric_is_not_found() {
        let state = app_state();
        let (status, _) = toggle_selection(Path("Humidity".to_string()), State(state.clone()))
            .await
            .unwrap_err();

        assert_eq!(status, StatusCode::NOT_FOUND);
        let Json(selection) = get_selection(State(state)).await;
        assert_eq!(selection, SelectionState::Unselected);
    }

    #[tokio::test]
    async fn test_clear_selection() {
        let state = app_state();
        state.scheduler.select("Vibration").unwrap();

        let Json(selection) = clear_selection(State(state)).await;
        assert_eq!(selection, SelectionState::Unselected);
    }

    #[tokio::test]
    async fn test_list_metrics_and_status() {
        let state = app_state();
        state.store.ingest_at(br#"{"Flow Rate": 55.0}"#, 1_000);

        let Json(metrics) = list_metrics(State(state.clone())).await;
        assert_eq!(metrics.len(), 7);

        let Json(view) = status(State(state)).await;
        assert_eq!(view.connection, ConnectionState::Disconnected);
        assert_eq!(view.endpoint, "broker.test:1883");
        assert_eq!(view.ticks, 1);
        assert_eq!(view.capacity, 50);
        assert_eq!(view.store.ingested, 1);
    }

    #[tokio::test]
    async fn test_latest_frame_is_json() {
        let state = app_state();
        let response = latest_frame(HeaderMap::new(), State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "empty");
        assert_eq!(json["reason"], "nothing_selected");
    }
}
