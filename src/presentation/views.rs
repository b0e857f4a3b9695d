// JSON views served by the handlers
use crate::application::ingestion_service::LinkState;
use crate::application::price_scheduler::{PriceBoard, PriceDay, SchedulerState};
use crate::application::telemetry_state::TelemetryState;
use crate::domain::device::DeviceRow;
use crate::domain::gauge::{BipolarArc, GaugeGeometry, GaugeRange, SingleArc};
use crate::domain::metric::{Metric, Quantity};
use crate::domain::price::PriceBucket;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryView {
    pub link: LinkState,
    pub solar: Metric,
    pub grid: Metric,
    pub load: Metric,
    pub battery: Metric,
    pub state_of_charge: Option<i64>,
    /// CSS colour for the battery gauge, from red (empty) to green (full).
    pub state_of_charge_colour: Option<String>,
    pub battery_modules: Vec<DeviceRow>,
    pub optimizers: Vec<DeviceRow>,
}

impl TelemetryView {
    pub fn new(state: &TelemetryState, link: LinkState) -> Self {
        Self {
            link,
            solar: state.solar,
            grid: state.grid,
            load: state.load,
            battery: state.battery,
            state_of_charge: state.state_of_charge,
            state_of_charge_colour: state.state_of_charge.map(soc_colour),
            battery_modules: state.battery_modules.rows().to_vec(),
            optimizers: state.optimizers.rows().to_vec(),
        }
    }
}

/// Gradient for a state of charge in percent: red below 50 fades into yellow,
/// yellow above 50 fades into green.
pub fn soc_colour(percent: i64) -> String {
    let p = percent.clamp(0, 100) as f64;
    let (red, green) = if p > 50.0 {
        (255.0 * (1.0 - (p - 50.0) / 50.0), 255.0)
    } else {
        (255.0, 255.0 * p / 50.0)
    };
    format!("rgb({}, {}, 0)", red.round() as u8, green.round() as u8)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GaugeView {
    Single {
        quantity: Quantity,
        range: GaugeRange,
        value: f64,
        geometry: SingleArc,
        left_path: String,
        right_path: String,
    },
    Bipolar {
        quantity: Quantity,
        range: GaugeRange,
        value: f64,
        geometry: BipolarArc,
        signed_path: String,
        background_paths: [String; 2],
    },
    /// Nothing observed yet.
    Pending { quantity: Quantity },
}

impl GaugeView {
    pub fn new(geometry: &GaugeGeometry, quantity: Quantity, metric: &Metric) -> Self {
        let range = match quantity {
            Quantity::Load | Quantity::Solar => GaugeRange::observed(metric),
            Quantity::Grid | Quantity::Battery => GaugeRange::symmetric(metric),
        };
        let (Some(range), Some(value)) = (range, metric.current) else {
            return GaugeView::Pending { quantity };
        };

        match quantity {
            Quantity::Load | Quantity::Solar => {
                let arc = geometry.single_arc(range.min, range.max, value);
                GaugeView::Single {
                    quantity,
                    range,
                    value,
                    left_path: arc.left_arc.svg_path(),
                    right_path: arc.right_arc.svg_path(),
                    geometry: arc,
                }
            }
            Quantity::Grid | Quantity::Battery => {
                let arc = geometry.bipolar_arc(range.min, range.max, value);
                GaugeView::Bipolar {
                    quantity,
                    range,
                    value,
                    signed_path: arc.signed_arc.arc.svg_path(),
                    background_paths: arc.background.map(|segment| segment.svg_path()),
                    geometry: arc,
                }
            }
        }
    }

    /// One view per quantity, in display order.
    pub fn all(geometry: &GaugeGeometry, state: &TelemetryState) -> Vec<GaugeView> {
        Quantity::ALL
            .iter()
            .map(|quantity| GaugeView::new(geometry, *quantity, state.metric(*quantity)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceBoardView {
    pub day: PriceDay,
    pub state: SchedulerState,
    pub date: Option<String>,
    pub buckets: Vec<PriceBucket>,
    pub error: Option<String>,
}

impl PriceBoardView {
    pub fn new(day: PriceDay, board: PriceBoard) -> Self {
        Self {
            day,
            state: board.state,
            date: board.date.map(|date| date.format("%Y-%m-%d").to_string()),
            buckets: board.buckets,
            error: board.error.map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub feed: LinkState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PriceError;
    use chrono::NaiveDate;

    #[test]
    fn test_soc_colour_gradient() {
        assert_eq!(soc_colour(0), "rgb(255, 0, 0)");
        assert_eq!(soc_colour(25), "rgb(255, 128, 0)");
        assert_eq!(soc_colour(50), "rgb(255, 255, 0)");
        assert_eq!(soc_colour(75), "rgb(128, 255, 0)");
        assert_eq!(soc_colour(100), "rgb(0, 255, 0)");
    }

    #[test]
    fn test_soc_colour_clamps() {
        assert_eq!(soc_colour(-20), soc_colour(0));
        assert_eq!(soc_colour(140), soc_colour(100));
    }

    #[test]
    fn test_gauge_pending_until_observed() {
        let geometry = GaugeGeometry::default();
        let view = GaugeView::new(&geometry, Quantity::Grid, &Metric::default());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["kind"], "pending");
        assert_eq!(json["quantity"], "grid");
    }

    #[test]
    fn test_gauge_kinds_per_quantity() {
        let geometry = GaugeGeometry::default();
        let metric = Metric::default().update(Some(-200.0)).update(Some(800.0));

        match GaugeView::new(&geometry, Quantity::Solar, &metric) {
            GaugeView::Single { range, value, geometry, .. } => {
                assert_eq!(range, GaugeRange { min: -200.0, max: 800.0 });
                assert_eq!(value, 800.0);
                assert!((geometry.value_angle - 405.0).abs() < 1e-9);
            }
            other => panic!("expected a single arc, got {:?}", other),
        }

        match GaugeView::new(&geometry, Quantity::Battery, &metric) {
            GaugeView::Bipolar { range, geometry, .. } => {
                assert_eq!(range, GaugeRange { min: -800.0, max: 800.0 });
                assert!((geometry.zero_angle - 270.0).abs() < 1e-9);
            }
            other => panic!("expected a bipolar arc, got {:?}", other),
        }
    }

    #[test]
    fn test_telemetry_view_json() {
        let state = TelemetryState {
            state_of_charge: Some(75),
            ..Default::default()
        };
        let json = serde_json::to_value(TelemetryView::new(&state, LinkState::Connected)).unwrap();
        assert_eq!(json["link"], "connected");
        assert_eq!(json["state_of_charge"], 75);
        assert_eq!(json["state_of_charge_colour"], "rgb(128, 255, 0)");
        assert_eq!(json["solar"]["current"], serde_json::Value::Null);
        assert_eq!(json["battery_modules"], serde_json::json!([]));
    }

    #[test]
    fn test_price_board_view_error_text() {
        let board = PriceBoard {
            state: SchedulerState::Retrying,
            date: NaiveDate::from_ymd_opt(2025, 10, 20),
            buckets: Vec::new(),
            error: Some(PriceError::Unavailable),
        };
        let json = serde_json::to_value(PriceBoardView::new(PriceDay::Tomorrow, board)).unwrap();
        assert_eq!(json["day"], "tomorrow");
        assert_eq!(json["state"], "retrying");
        assert_eq!(json["date"], "2025-10-20");
        assert_eq!(json["error"], "No price data available.");
    }
}
