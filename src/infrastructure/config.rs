use crate::application::ingestion_service::FeedTopics;
use anyhow::Context;
use chrono::{NaiveTime, TimeDelta};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub prices: PriceSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MqttSettings {
    /// `mqtt://host[:port]` or `mqtts://host[:port]`
    pub broker: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
    pub topics: TopicSettings,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: "mqtt://localhost:1883".to_string(),
            client_id: "energy-dashboard".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            reconnect_delay_secs: 5,
            topics: TopicSettings::default(),
        }
    }
}

impl MqttSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TopicSettings {
    pub hub: String,
    pub battery_modules: String,
    pub optimizers: String,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            hub: "extapi/data/ehub".to_string(),
            battery_modules: "extapi/data/eso".to_string(),
            optimizers: "extapi/data/sso".to_string(),
        }
    }
}

impl TopicSettings {
    pub fn feed_topics(&self) -> FeedTopics {
        FeedTopics {
            hub: self.hub.clone(),
            battery_modules: self.battery_modules.clone(),
            optimizers: self.optimizers.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriceSettings {
    pub base_url: String,
    /// Bidding zone, e.g. `SE1`.
    pub region: String,
    /// Local hour at which next-day prices are published.
    pub publish_hour: u32,
    pub retry_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.elprisetjustnu.se".to_string(),
            region: "SE1".to_string(),
            publish_hour: 13,
            retry_secs: 60,
            timeout_secs: 30,
        }
    }
}

impl PriceSettings {
    pub fn publish_time(&self) -> anyhow::Result<NaiveTime> {
        NaiveTime::from_hms_opt(self.publish_hour, 0, 0)
            .with_context(|| format!("Invalid prices.publish_hour: {}", self.publish_hour))
    }

    pub fn retry_after(&self) -> anyhow::Result<TimeDelta> {
        TimeDelta::from_std(Duration::from_secs(self.retry_secs))
            .with_context(|| format!("Invalid prices.retry_secs: {}", self.retry_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Load `config/dashboard.*` (optional) overlaid with `DASHBOARD__SECTION__KEY`
/// environment variables.
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
