// Per-device readings and the keyed row registry
use serde::Serialize;

/// Length of the identifier suffix used as the optimizer row key. The upstream
/// scheme only distinguishes optimizers by the tail of their serial.
pub const OPTIMIZER_ID_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Battery modules (ESO), voltage is the module voltage `ubat`.
    BatteryModule,
    /// Solar optimizers (SSO), voltage is the panel voltage `upv`.
    Optimizer,
}

impl DeviceClass {
    /// Row key for a raw identifier of this class.
    pub fn row_key(self, raw_id: &str) -> String {
        match self {
            DeviceClass::BatteryModule => raw_id.to_string(),
            DeviceClass::Optimizer => {
                let skip = raw_id.chars().count().saturating_sub(OPTIMIZER_ID_SUFFIX_LEN);
                raw_id.chars().skip(skip).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRow {
    pub id: String,
    pub voltage: Option<i64>,
    pub temperature: Option<i64>,
    pub fault_code: Option<String>,
}

/// Rows keyed by device id. Holds at most one row per id; a replaced row moves
/// to the end, otherwise rows keep the order their ids were first seen in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeviceRegistry {
    rows: Vec<DeviceRow>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the row for `row.id`. Rows without an id are dropped.
    /// Returns whether the registry changed.
    pub fn upsert(&mut self, row: DeviceRow) -> bool {
        if row.id.is_empty() {
            return false;
        }
        self.rows.retain(|existing| existing.id != row.id);
        self.rows.push(row);
        true
    }

    pub fn rows(&self) -> &[DeviceRow] {
        &self.rows
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
