// MQTT feed - Live telemetry from the broker
use crate::application::telemetry_feed::{FeedSession, RawMessage, TelemetryFeed};
use crate::infrastructure::config::MqttSettings;
use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration, Transport,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const REQUEST_CAPACITY: usize = 16;
const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MqttFeed {
    settings: MqttSettings,
}

impl MqttFeed {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    fn options(&self) -> anyhow::Result<MqttOptions> {
        let broker: BrokerAddress = self
            .settings
            .broker
            .parse()
            .with_context(|| format!("Invalid mqtt.broker {}", self.settings.broker))?;

        let mut options = MqttOptions::new(&self.settings.client_id, broker.host, broker.port);
        options.set_keep_alive(self.settings.keep_alive());

        if let (Some(username), Some(password)) = (&self.settings.username, &self.settings.password) {
            options.set_credentials(username, password);
        }
        if broker.tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Native));
        }
        Ok(options)
    }
}

#[async_trait]
impl TelemetryFeed for MqttFeed {
    async fn connect(&self, topics: &[String]) -> anyhow::Result<Box<dyn FeedSession>> {
        let (client, mut eventloop) = AsyncClient::new(self.options()?, REQUEST_CAPACITY);

        // Drive the event loop until the broker accepts us, so connection
        // failures surface here rather than on the first receive.
        loop {
            let event = eventloop
                .poll()
                .await
                .with_context(|| format!("Failed to connect to MQTT broker {}", self.settings.broker))?;
            if let Event::Incoming(Packet::ConnAck(ack)) = event {
                info!("MQTT connected to {}: {:?}", self.settings.broker, ack.code);
                break;
            }
        }

        for topic in topics {
            client
                .subscribe(topic.as_str(), QoS::AtMostOnce)
                .await
                .with_context(|| format!("Failed to subscribe to {}", topic))?;
        }

        Ok(Box::new(MqttSession { client, eventloop }))
    }
}

/// Owns the broker connection. Dropping it closes the socket.
struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

#[async_trait]
impl FeedSession for MqttSession {
    async fn recv(&mut self) -> anyhow::Result<Option<RawMessage>> {
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::Publish(publish)) => {
                    let topic = String::from_utf8_lossy(AsRef::<[u8]>::as_ref(&publish.topic));
                    return Ok(Some(RawMessage::new(topic.into_owned(), publish.payload)));
                }
                Event::Incoming(Packet::SubAck(ack)) => {
                    debug!("MQTT subscription acknowledged: {:?}", ack.return_codes);
                }
                Event::Incoming(Packet::Disconnect) => return Ok(None),
                _ => {}
            }
        }
    }

    async fn close(self: Box<Self>) {
        let MqttSession { client, mut eventloop } = *self;
        if let Err(e) = client.disconnect().await {
            debug!("Error disconnecting MQTT client: {}", e);
            return;
        }

        // the disconnect request only goes out when the event loop is polled
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH, flush).await.is_err() {
            debug!("MQTT disconnect did not flush in time");
        }
        info!("MQTT session closed");
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerUrlError {
    #[error("unsupported scheme, expected mqtt:// or mqtts://")]
    Scheme,

    #[error("invalid port {0:?}")]
    Port(String),

    #[error("missing host")]
    MissingHost,
}

/// `mqtt://host[:port]` or `mqtts://host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BrokerAddress {
    host: String,
    port: u16,
    tls: bool,
}

impl FromStr for BrokerAddress {
    type Err = BrokerUrlError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let (tls, authority) = match url.split_once("://") {
            Some(("mqtt", rest)) => (false, rest),
            Some(("mqtts", rest)) => (true, rest),
            _ => return Err(BrokerUrlError::Scheme),
        };
        let authority = authority.trim_end_matches('/');

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| BrokerUrlError::Port(port.to_string()))?;
                (host, port)
            }
            None if tls => (authority, TLS_PORT),
            None => (authority, PLAIN_PORT),
        };
        if host.is_empty() {
            return Err(BrokerUrlError::MissingHost);
        }

        Ok(BrokerAddress {
            host: host.to_string(),
            port,
            tls,
        })
    }
}
