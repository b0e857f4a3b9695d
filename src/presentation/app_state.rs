// Application state for HTTP handlers
use crate::application::ingestion_service::LinkState;
use crate::application::price_service::PriceBoards;
use crate::application::telemetry_state::TelemetryState;
use crate::domain::gauge::GaugeGeometry;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: watch::Receiver<TelemetryState>,
    pub link: watch::Receiver<LinkState>,
    pub prices: PriceBoards,
    pub geometry: GaugeGeometry,
}
