// Telemetry state owned by the ingestion loop
use crate::domain::device::{DeviceClass, DeviceRegistry};
use crate::domain::feed::FeedMessage;
use crate::domain::metric::{Metric, Quantity};
use serde::Serialize;

/// Everything the live feed has told us so far. Only the ingestion loop writes
/// it; readers get clones through a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryState {
    pub solar: Metric,
    pub grid: Metric,
    pub load: Metric,
    pub battery: Metric,
    /// State of charge in percent. Zero readings are treated as noise.
    pub state_of_charge: Option<i64>,
    pub battery_modules: DeviceRegistry,
    pub optimizers: DeviceRegistry,
}

impl TelemetryState {
    pub fn metric(&self, quantity: Quantity) -> &Metric {
        match quantity {
            Quantity::Solar => &self.solar,
            Quantity::Grid => &self.grid,
            Quantity::Load => &self.load,
            Quantity::Battery => &self.battery,
        }
    }

    fn metric_mut(&mut self, quantity: Quantity) -> &mut Metric {
        match quantity {
            Quantity::Solar => &mut self.solar,
            Quantity::Grid => &mut self.grid,
            Quantity::Load => &mut self.load,
            Quantity::Battery => &mut self.battery,
        }
    }

    pub fn registry(&self, class: DeviceClass) -> &DeviceRegistry {
        match class {
            DeviceClass::BatteryModule => &self.battery_modules,
            DeviceClass::Optimizer => &self.optimizers,
        }
    }

    fn registry_mut(&mut self, class: DeviceClass) -> &mut DeviceRegistry {
        match class {
            DeviceClass::BatteryModule => &mut self.battery_modules,
            DeviceClass::Optimizer => &mut self.optimizers,
        }
    }

    /// Fold one parsed message into the state. Returns whether anything changed.
    pub fn apply(&mut self, message: FeedMessage) -> bool {
        match message {
            FeedMessage::Hub(reading) => {
                let mut changed = false;
                for quantity in Quantity::ALL {
                    let metric = self.metric_mut(quantity);
                    let updated = metric.update(reading.sample(quantity));
                    changed |= updated != *metric;
                    *metric = updated;
                }

                if let Some(soc) = reading.state_of_charge.filter(|soc| *soc != 0.0) {
                    let soc = soc.round() as i64;
                    changed |= self.state_of_charge != Some(soc);
                    self.state_of_charge = Some(soc);
                }
                changed
            }
            FeedMessage::Device { class, row } => self.registry_mut(class).upsert(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::DeviceRow;
    use crate::domain::feed::{HubReading, TopicKind};

    fn hub(solar: Option<f64>, soc: Option<f64>) -> FeedMessage {
        FeedMessage::Hub(HubReading {
            solar,
            state_of_charge: soc,
            ..Default::default()
        })
    }

    #[test]
    fn test_hub_updates_metrics() {
        let mut state = TelemetryState::default();
        assert!(state.apply(hub(Some(800.0), None)));
        assert!(state.apply(hub(Some(1200.0), None)));

        assert_eq!(state.solar.current, Some(1200.0));
        assert_eq!(state.solar.min, Some(800.0));
        assert_eq!(state.grid, Metric::default());
    }

    #[test]
    fn test_zero_state_of_charge_is_suppressed() {
        let mut state = TelemetryState::default();
        state.apply(hub(None, Some(64.0)));
        assert_eq!(state.state_of_charge, Some(64));

        assert!(!state.apply(hub(None, Some(0.0))));
        assert_eq!(state.state_of_charge, Some(64));
    }

    #[test]
    fn test_small_state_of_charge_is_kept() {
        let mut state = TelemetryState::default();
        state.apply(FeedMessage::parse(TopicKind::Hub, br#"{"soc": {"val": "64"}}"#).unwrap());
        assert_eq!(state.state_of_charge, Some(64));

        assert!(state.apply(FeedMessage::parse(TopicKind::Hub, br#"{"soc": {"val": "0.4"}}"#).unwrap()));
        assert_eq!(state.state_of_charge, Some(0));
    }

    #[test]
    fn test_empty_hub_message_changes_nothing() {
        let mut state = TelemetryState::default();
        state.apply(hub(Some(5.0), Some(50.0)));
        let before = state.clone();

        assert!(!state.apply(hub(None, None)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_device_rows_go_to_their_class() {
        let mut state = TelemetryState::default();
        let row = DeviceRow {
            id: "123456789".to_string(),
            voltage: Some(40),
            temperature: None,
            fault_code: None,
        };
        assert!(state.apply(FeedMessage::Device {
            class: DeviceClass::Optimizer,
            row: row.clone(),
        }));

        assert_eq!(state.registry(DeviceClass::Optimizer).rows(), [row]);
        assert!(state.registry(DeviceClass::BatteryModule).is_empty());
    }
}
