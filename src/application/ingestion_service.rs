// Ingestion loop - Feed messages into the telemetry state
use crate::application::telemetry_feed::{FeedSession, RawMessage, TelemetryFeed};
use crate::application::telemetry_state::TelemetryState;
use crate::domain::device::DeviceClass;
use crate::domain::feed::{FeedMessage, TopicKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Topic names for each message shape.
#[derive(Debug, Clone)]
pub struct FeedTopics {
    pub hub: String,
    pub battery_modules: String,
    pub optimizers: String,
}

impl FeedTopics {
    pub fn kind_of(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.hub {
            Some(TopicKind::Hub)
        } else if topic == self.battery_modules {
            Some(TopicKind::Devices(DeviceClass::BatteryModule))
        } else if topic == self.optimizers {
            Some(TopicKind::Devices(DeviceClass::Optimizer))
        } else {
            None
        }
    }

    pub fn all(&self) -> Vec<String> {
        vec![
            self.hub.clone(),
            self.battery_modules.clone(),
            self.optimizers.clone(),
        ]
    }
}

enum SessionEnd {
    Stopped,
    Ended,
    Lost(anyhow::Error),
}

pub struct IngestionService {
    feed: Arc<dyn TelemetryFeed>,
    topics: FeedTopics,
    reconnect_delay: Duration,
    state_tx: watch::Sender<TelemetryState>,
    link_tx: watch::Sender<LinkState>,
}

impl IngestionService {
    pub fn new(feed: Arc<dyn TelemetryFeed>, topics: FeedTopics, reconnect_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(TelemetryState::default());
        let (link_tx, _) = watch::channel(LinkState::Disconnected);
        Self {
            feed,
            topics,
            reconnect_delay,
            state_tx,
            link_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_link(&self) -> watch::Receiver<LinkState> {
        self.link_tx.subscribe()
    }

    /// Parse one raw message and fold it into the state. Malformed messages and
    /// unknown topics are logged and dropped. Returns whether the state changed.
    pub fn handle(&self, raw: &RawMessage) -> bool {
        let Some(kind) = self.topics.kind_of(&raw.topic) else {
            debug!("Ignoring message on unexpected topic {}", raw.topic);
            return false;
        };

        match FeedMessage::parse(kind, &raw.payload) {
            Ok(message) => self.state_tx.send_if_modified(|state| state.apply(message)),
            Err(e) => {
                warn!("Discarding malformed message on {}: {}", raw.topic, e);
                false
            }
        }
    }

    /// Run until `stop_rx` turns true (or its sender goes away). Lost connections
    /// are re-established after the reconnect delay.
    pub async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let topics = self.topics.all();

        loop {
            let session = tokio::select! {
                result = self.feed.connect(&topics) => result,
                _ = stop_requested(&mut stop_rx) => break,
            };

            let mut session = match session {
                Ok(session) => session,
                Err(e) => {
                    warn!("Feed connection failed: {:#}", e);
                    if self.pause(&mut stop_rx).await {
                        break;
                    }
                    continue;
                }
            };

            self.set_link(LinkState::Connected);
            info!("Subscribed to {} feed topics", topics.len());

            match self.pump(session.as_mut(), &mut stop_rx).await {
                SessionEnd::Stopped => {
                    session.close().await;
                    self.set_link(LinkState::Disconnected);
                    break;
                }
                SessionEnd::Ended => info!("Feed ended, reconnecting"),
                SessionEnd::Lost(e) => warn!("Feed connection lost: {:#}", e),
            }

            drop(session);
            self.set_link(LinkState::Disconnected);
            if self.pause(&mut stop_rx).await {
                break;
            }
        }

        info!("Ingestion loop stopped");
    }

    async fn pump(
        &self,
        session: &mut dyn FeedSession,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                result = session.recv() => match result {
                    Ok(Some(raw)) => {
                        self.handle(&raw);
                    }
                    Ok(None) => return SessionEnd::Ended,
                    Err(e) => return SessionEnd::Lost(e),
                },
                _ = stop_requested(stop_rx) => return SessionEnd::Stopped,
            }
        }
    }

    /// Wait out the reconnect delay. Returns true if a stop arrived meanwhile.
    async fn pause(&self, stop_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.reconnect_delay) => false,
            _ = stop_requested(stop_rx) => true,
        }
    }

    fn set_link(&self, link: LinkState) {
        self.link_tx.send_if_modified(|current| {
            let changed = *current != link;
            *current = link;
            changed
        });
    }
}

pub(crate) async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    // a dropped sender counts as a stop
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn topics() -> FeedTopics {
        FeedTopics {
            hub: "extapi/data/ehub".to_string(),
            battery_modules: "extapi/data/eso".to_string(),
            optimizers: "extapi/data/sso".to_string(),
        }
    }

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        closes: AtomicUsize,
        drops: AtomicUsize,
    }

    /// Each connect plays the next script. A script that ends with `lose` errors
    /// out after its messages; otherwise the session idles.
    struct ScriptedFeed {
        scripts: Mutex<VecDeque<(Vec<RawMessage>, bool)>>,
        counters: Arc<Counters>,
    }

    struct ScriptedSession {
        messages: VecDeque<RawMessage>,
        lose: bool,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl TelemetryFeed for ScriptedFeed {
        async fn connect(&self, _topics: &[String]) -> anyhow::Result<Box<dyn FeedSession>> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            let Some((messages, lose)) = self.scripts.lock().unwrap().pop_front() else {
                anyhow::bail!("broker unreachable");
            };
            Ok(Box::new(ScriptedSession {
                messages: messages.into(),
                lose,
                counters: self.counters.clone(),
            }))
        }
    }

    #[async_trait]
    impl FeedSession for ScriptedSession {
        async fn recv(&mut self) -> anyhow::Result<Option<RawMessage>> {
            if let Some(message) = self.messages.pop_front() {
                return Ok(Some(message));
            }
            if self.lose {
                anyhow::bail!("connection reset");
            }
            std::future::pending().await
        }

        async fn close(self: Box<Self>) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Drop for ScriptedSession {
        fn drop(&mut self) {
            self.counters.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn service(scripts: Vec<(Vec<RawMessage>, bool)>) -> (IngestionService, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let feed = ScriptedFeed {
            scripts: Mutex::new(scripts.into()),
            counters: counters.clone(),
        };
        let service = IngestionService::new(Arc::new(feed), topics(), Duration::from_millis(10));
        (service, counters)
    }

    #[test]
    fn test_handle_routes_by_topic() {
        let (service, _) = service(vec![]);
        let state = service.subscribe();

        assert!(service.handle(&RawMessage::new(
            "extapi/data/ehub",
            r#"{"pbat": {"val": "-450.2"}, "soc": {"val": "81"}}"#,
        )));
        assert!(service.handle(&RawMessage::new(
            "extapi/data/eso",
            r#"{"id": {"val": "ESO-1"}, "ubat": {"val": "52.1"}}"#,
        )));

        let state = state.borrow();
        assert_eq!(state.battery.current, Some(-450.0));
        assert_eq!(state.state_of_charge, Some(81));
        assert_eq!(state.battery_modules.len(), 1);
    }

    #[test]
    fn test_handle_discards_bad_input() {
        let (service, _) = service(vec![]);
        let state = service.subscribe();

        assert!(!service.handle(&RawMessage::new("extapi/data/ehub", "{{{")));
        assert!(!service.handle(&RawMessage::new("extapi/data/ehub", "42")));
        assert!(!service.handle(&RawMessage::new("other/topic", r#"{"ppv": {"val": "1"}}"#)));
        assert!(!service.handle(&RawMessage::new("extapi/data/sso", r#"{"upv": {"val": "30"}}"#)));

        assert_eq!(*state.borrow(), TelemetryState::default());
    }

    #[tokio::test]
    async fn test_run_releases_session_on_stop() {
        let script = vec![
            RawMessage::new("extapi/data/ehub", r#"{"ppv": {"val": "900"}}"#),
            RawMessage::new("extapi/data/ehub", "garbage"),
            RawMessage::new("extapi/data/sso", r#"{"id": {"val": "SSO-0000123456789"}}"#),
        ];
        let (service, counters) = service(vec![(script, false)]);
        let mut state = service.subscribe();
        let mut link = service.subscribe_link();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(service.run(stop_rx));
        state.wait_for(|s| s.optimizers.len() == 1).await.unwrap();
        link.wait_for(|l| *l == LinkState::Connected).await.unwrap();

        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let state = state.borrow();
        assert_eq!(state.solar.current, Some(900.0));
        assert_eq!(state.optimizers.rows()[0].id, "123456789");
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 1);
        assert_eq!(*link.borrow(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_reconnects_after_loss() {
        let first = vec![RawMessage::new("extapi/data/ehub", r#"{"ppv": {"val": "100"}}"#)];
        let second = vec![RawMessage::new("extapi/data/ehub", r#"{"ppv": {"val": "300"}}"#)];
        let (service, counters) = service(vec![(first, true), (second, false)]);
        let mut state = service.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(service.run(stop_rx));
        state.wait_for(|s| s.solar.current == Some(300.0)).await.unwrap();
        drop(stop_tx);
        handle.await.unwrap();

        assert_eq!(state.borrow().solar.min, Some(100.0));
        assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
        // the lost session was dropped without a graceful close
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.drops.load(Ordering::SeqCst), 2);
    }
}
