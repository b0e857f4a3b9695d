// Feed traits for live telemetry
use async_trait::async_trait;
use bytes::Bytes;

/// One message as delivered by the broker, before any parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[async_trait]
pub trait TelemetryFeed: Send + Sync {
    /// Open a connection subscribed to `topics`. The returned session owns the
    /// connection and releases it when dropped.
    async fn connect(&self, topics: &[String]) -> anyhow::Result<Box<dyn FeedSession>>;
}

#[async_trait]
pub trait FeedSession: Send {
    /// Next message from the subscribed topics. `Ok(None)` means the feed ended
    /// cleanly; an error means the connection was lost.
    async fn recv(&mut self) -> anyhow::Result<Option<RawMessage>>;

    /// Graceful disconnect.
    async fn close(self: Box<Self>);
}
