// HTTP price source - Day-ahead spot prices over JSON
use crate::application::price_source::PriceSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: String,
    region: String,
}

impl HttpPriceSource {
    pub fn new(base_url: &str, region: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            region: region.to_string(),
        })
    }

    fn build_day_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/api/v1/prices/{}/{:02}-{:02}_{}.json",
            self.base_url,
            date.year(),
            date.month(),
            date.day(),
            self.region
        )
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_day(&self, date: NaiveDate) -> Result<serde_json::Value> {
        let url = self.build_day_url(date);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Price request for {} failed with status {}", date, status);
        }

        response
            .json::<serde_json::Value>()
            .await
            .context("Failed to parse price response")
    }
}
