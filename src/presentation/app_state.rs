// Application state for HTTP handlers
use crate::application::connector::TransportConnector;
use crate::application::scheduler::RefreshScheduler;
use crate::application::store::TelemetryStore;
use crate::presentation::frames::Frame;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TelemetryStore>,
    pub scheduler: Arc<RefreshScheduler>,
    pub connector: Arc<TransportConnector>,
    pub frames: watch::Receiver<Frame>,
    pub shutdown: CancellationToken,
}
