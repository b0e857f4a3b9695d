// HTTP request handlers
use crate::application::price_scheduler::PriceDay;
use crate::presentation::app_state::AppState;
use crate::presentation::views::{GaugeView, PriceBoardView, StatusView, TelemetryView};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    Json(StatusView {
        feed: *state.link.borrow(),
    })
}

/// Current telemetry snapshot
pub async fn telemetry(State(state): State<Arc<AppState>>) -> Json<TelemetryView> {
    let link = *state.link.borrow();
    Json(TelemetryView::new(&state.telemetry.borrow(), link))
}

/// Gauge geometry for every quantity
pub async fn gauges(State(state): State<Arc<AppState>>) -> Json<Vec<GaugeView>> {
    Json(GaugeView::all(&state.geometry, &state.telemetry.borrow()))
}

pub async fn prices_today(State(state): State<Arc<AppState>>) -> Json<PriceBoardView> {
    Json(price_board(&state, PriceDay::Today))
}

pub async fn prices_tomorrow(State(state): State<Arc<AppState>>) -> Json<PriceBoardView> {
    Json(price_board(&state, PriceDay::Tomorrow))
}

fn price_board(state: &AppState, day: PriceDay) -> PriceBoardView {
    PriceBoardView::new(day, state.prices.get(day))
}

/// Push a telemetry snapshot now and after every state change
pub async fn telemetry_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut telemetry = state.telemetry.clone();
    let link = state.link.clone();

    let stream = async_stream::stream! {
        telemetry.mark_changed();
        while telemetry.changed().await.is_ok() {
            let view = TelemetryView::new(&telemetry.borrow_and_update(), *link.borrow());
            match Event::default().event("telemetry").json_data(&view) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!("Failed to encode telemetry event: {}", e),
            }
        }
        debug!("Telemetry stream closed");
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
