// Feed message shapes, one variant per subscribed topic
use crate::domain::device::{DeviceClass, DeviceRow};
use crate::domain::metric::{numeric, sum_phases, Quantity};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Hub,
    Devices(DeviceClass),
}

#[derive(Debug, Error)]
pub enum MalformedMessage {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Samples carried by one hub message. Every field is optional; absent or
/// unreadable fields leave the corresponding state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubReading {
    pub solar: Option<f64>,
    pub grid: Option<f64>,
    pub load: Option<f64>,
    pub battery: Option<f64>,
    pub state_of_charge: Option<f64>,
}

impl HubReading {
    pub fn sample(&self, quantity: Quantity) -> Option<f64> {
        match quantity {
            Quantity::Solar => self.solar,
            Quantity::Grid => self.grid,
            Quantity::Load => self.load,
            Quantity::Battery => self.battery,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Hub(HubReading),
    Device { class: DeviceClass, row: DeviceRow },
}

impl FeedMessage {
    pub fn parse(kind: TopicKind, payload: &[u8]) -> Result<FeedMessage, MalformedMessage> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(fields) = value else {
            return Err(MalformedMessage::NotAnObject);
        };

        Ok(match kind {
            TopicKind::Hub => FeedMessage::Hub(parse_hub(&fields)),
            TopicKind::Devices(class) => FeedMessage::Device {
                class,
                row: parse_device(class, &fields),
            },
        })
    }
}

fn parse_hub(fields: &Map<String, Value>) -> HubReading {
    HubReading {
        solar: rounded_val(fields, "ppv"),
        grid: phases(fields, "pext"),
        load: phases(fields, "pload"),
        battery: rounded_val(fields, "pbat"),
        // rounded by the consumer, after its zero check
        state_of_charge: val(fields, "soc").and_then(numeric),
    }
}

fn parse_device(class: DeviceClass, fields: &Map<String, Value>) -> DeviceRow {
    let voltage_field = match class {
        DeviceClass::BatteryModule => "ubat",
        DeviceClass::Optimizer => "upv",
    };

    let raw_id = val(fields, "id").and_then(text).unwrap_or_default();

    DeviceRow {
        id: class.row_key(&raw_id),
        voltage: rounded_val(fields, voltage_field).map(|v| v as i64),
        temperature: rounded_val(fields, "temp").map(|v| v as i64),
        fault_code: val(fields, "faultcode").and_then(text),
    }
}

/// `{"<field>": {"val": ...}}`
fn val<'a>(fields: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    fields.get(field)?.get("val")
}

fn rounded_val(fields: &Map<String, Value>, field: &str) -> Option<f64> {
    val(fields, field).and_then(numeric).map(f64::round)
}

fn phases(fields: &Map<String, Value>, field: &str) -> Option<f64> {
    match fields.get(field) {
        None | Some(Value::Null) => None,
        Some(channels) => sum_phases(channels),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
