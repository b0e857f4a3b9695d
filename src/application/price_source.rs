// Price source trait for day-ahead prices
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Raw price records for one calendar day. A day that has not been
    /// published yet is an error like any other.
    async fn fetch_day(&self, date: NaiveDate) -> anyhow::Result<serde_json::Value>;
}
