// Route table for the dashboard HTTP surface
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    clear_selection, get_selection, health_check, latest_frame, list_metrics, status, stream_frames,
    toggle_selection,
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/metrics", get(list_metrics))
        .route("/selection", get(get_selection).delete(clear_selection))
        .route("/selection/:metric", post(toggle_selection))
        .route("/frame", get(latest_frame))
        .route("/frame/stream", get(stream_frames))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
