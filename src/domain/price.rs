// Day-ahead price aggregation and classification
use crate::domain::metric::numeric;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Number of buckets marked at each end of the price ranking.
pub const RANKED_BUCKETS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("No price data available.")]
    Unavailable,

    #[error("No price data available for the selected date.")]
    NoData,
}

/// Raw record from the price source. `price` is in SEK per kWh.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub time_start: String,
    pub price: f64,
}

impl PricePoint {
    /// Hour of day from an ISO-like timestamp (`YYYY-MM-DDTHH:MM...`).
    pub fn hour(&self) -> Option<u32> {
        self.time_start
            .get(11..13)?
            .parse::<u32>()
            .ok()
            .filter(|hour| *hour < 24)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Cheapest,
    Priciest,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceBucket {
    pub hour: u32,
    pub hour_label: String,
    /// Average price in öre per kWh.
    pub price: i64,
    pub classification: Classification,
}

/// Read the records of a price payload. Anything but a non-empty list is "no data".
pub fn parse_points(payload: &Value) -> Result<Vec<PricePoint>, PriceError> {
    let records = match payload {
        Value::Array(records) if !records.is_empty() => records,
        _ => return Err(PriceError::NoData),
    };

    Ok(records
        .iter()
        .filter_map(|record| {
            let time_start = record.get("time_start")?.as_str()?.to_string();
            let price = record.get("SEK_per_kWh").and_then(numeric).unwrap_or(0.0);
            Some(PricePoint { time_start, price })
        })
        .collect())
}

/// Average raw points per hour, convert to öre and classify the cheapest and
/// priciest hours. Buckets come back sorted by hour.
pub fn aggregate(points: &[PricePoint]) -> Result<Vec<PriceBucket>, PriceError> {
    let mut hourly: BTreeMap<u32, (f64, u32)> = BTreeMap::new();
    for point in points {
        let Some(hour) = point.hour() else {
            continue;
        };
        let entry = hourly.entry(hour).or_insert((0.0, 0));
        entry.0 += point.price;
        entry.1 += 1;
    }

    if hourly.is_empty() {
        return Err(PriceError::NoData);
    }

    let mut buckets: Vec<PriceBucket> = hourly
        .into_iter()
        .map(|(hour, (sum, count))| PriceBucket {
            hour,
            hour_label: hour_label(hour),
            price: (sum / f64::from(count) * 100.0).round() as i64,
            classification: Classification::Normal,
        })
        .collect();

    classify(&mut buckets);
    Ok(buckets)
}

/// Aggregate a raw payload straight from the price source.
pub fn aggregate_payload(payload: &Value) -> Result<Vec<PriceBucket>, PriceError> {
    aggregate(&parse_points(payload)?)
}

/// Mark the `RANKED_BUCKETS` cheapest and priciest hours. With fewer than twice
/// that many buckets the sets overlap, and priciest takes precedence.
fn classify(buckets: &mut [PriceBucket]) {
    let mut ranked: Vec<(i64, u32)> = buckets.iter().map(|b| (b.price, b.hour)).collect();
    // stable: equal prices keep hour order
    ranked.sort_by_key(|(price, _)| *price);

    let cheapest: HashSet<u32> = ranked.iter().take(RANKED_BUCKETS).map(|(_, h)| *h).collect();
    let priciest: HashSet<u32> = ranked
        .iter()
        .skip(ranked.len().saturating_sub(RANKED_BUCKETS))
        .map(|(_, h)| *h)
        .collect();

    for bucket in buckets {
        bucket.classification = if priciest.contains(&bucket.hour) {
            Classification::Priciest
        } else if cheapest.contains(&bucket.hour) {
            Classification::Cheapest
        } else {
            Classification::Normal
        };
    }
}

fn hour_label(hour: u32) -> String {
    format!("{:02}:00–{:02}:00", hour, (hour + 1) % 24)
}
