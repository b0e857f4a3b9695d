// Running metric reducer and sample helpers
use serde::Serialize;
use serde_json::Value;

/// Physical quantities tracked from the hub topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Solar,
    Grid,
    Load,
    Battery,
}

impl Quantity {
    pub const ALL: [Quantity; 4] = [Self::Solar, Self::Grid, Self::Load, Self::Battery];
}

/// Current/min/max triple for one quantity. All fields are unset until the first
/// valid sample, and set together from then on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metric {
    pub current: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Metric {
    /// Fold one sample into the metric. Missing and non-finite samples are ignored.
    #[must_use]
    pub fn update(self, sample: Option<f64>) -> Metric {
        let Some(value) = sample.filter(|v| v.is_finite()) else {
            return self;
        };

        Metric {
            current: Some(value),
            min: Some(self.min.map_or(value, |min| min.min(value))),
            max: Some(self.max.map_or(value, |max| max.max(value))),
        }
    }

    pub fn is_observed(&self) -> bool {
        self.current.is_some()
    }
}

/// Read a feed number that may arrive as a JSON number or a numeric string.
pub fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Sum the `L1`/`L2`/`L3` channels of a three-phase object into one rounded sample.
/// Missing channels count as zero; an unreadable channel spoils the whole sample.
pub fn sum_phases(channels: &Value) -> Option<f64> {
    let mut total = 0.0;
    for key in ["L1", "L2", "L3"] {
        match channels.get(key) {
            None | Some(Value::Null) => {}
            Some(channel) => total += numeric(channel)?,
        }
    }
    Some(total.round())
}
