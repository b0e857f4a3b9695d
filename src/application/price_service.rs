// Price service - Drives one price scheduler against the real clock
use crate::application::clock::Clock;
use crate::application::ingestion_service::stop_requested;
use crate::application::price_scheduler::{FetchRequest, PriceBoard, PriceDay, PriceScheduler};
use crate::application::price_source::PriceSource;
use crate::domain::price::{aggregate_payload, PriceBucket, PriceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct PriceService {
    scheduler: PriceScheduler,
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    board_tx: watch::Sender<PriceBoard>,
}

impl PriceService {
    pub fn new(scheduler: PriceScheduler, source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>) -> Self {
        let (board_tx, _) = watch::channel(scheduler.board().clone());
        Self {
            scheduler,
            source,
            clock,
            board_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PriceBoard> {
        self.board_tx.subscribe()
    }

    /// Run the scheduler until `stop_rx` turns true. Pending timers are dropped
    /// with the task.
    pub async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        let day = self.scheduler.day();
        self.scheduler.start(self.clock.now());
        info!("Price scheduler for {:?} started", day);

        loop {
            let now = self.clock.now();
            if let Some(request) = self.scheduler.poll(now) {
                self.publish();
                let outcome = tokio::select! {
                    outcome = self.fetch(request) => outcome,
                    _ = stop_requested(&mut stop_rx) => break,
                };
                self.scheduler.complete(self.clock.now(), outcome);
                self.publish();
                continue;
            }
            self.publish();

            let Some(wake_at) = self.scheduler.next_wakeup() else {
                stop_requested(&mut stop_rx).await;
                break;
            };
            let delay = (wake_at - now).to_std().unwrap_or(Duration::ZERO);
            debug!("{:?} prices: next wakeup at {} (in {:?})", day, wake_at, delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_requested(&mut stop_rx) => break,
            }
        }

        info!("Price scheduler for {:?} stopped", day);
    }

    async fn fetch(&self, request: FetchRequest) -> Result<Vec<PriceBucket>, PriceError> {
        let day = self.scheduler.day();
        info!("Fetching {:?} prices for {}", day, request.date);

        let payload = self.source.fetch_day(request.date).await.map_err(|e| {
            warn!("Price fetch for {} failed: {:#}", request.date, e);
            PriceError::Unavailable
        })?;

        let buckets = aggregate_payload(&payload).inspect_err(|e| {
            warn!("Price payload for {} unusable: {}", request.date, e);
        })?;
        info!("Loaded {} hourly prices for {}", buckets.len(), request.date);
        Ok(buckets)
    }

    fn publish(&self) {
        let board = self.scheduler.board();
        self.board_tx.send_if_modified(|current| {
            if current == board {
                return false;
            }
            *current = board.clone();
            true
        });
    }
}

/// Handles the presentation layer reads price boards through.
#[derive(Clone)]
pub struct PriceBoards {
    pub today: watch::Receiver<PriceBoard>,
    pub tomorrow: watch::Receiver<PriceBoard>,
}

impl PriceBoards {
    pub fn get(&self, day: PriceDay) -> PriceBoard {
        match day {
            PriceDay::Today => self.today.borrow().clone(),
            PriceDay::Tomorrow => self.tomorrow.borrow().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::price_scheduler::SchedulerState;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Wall clock that follows tokio's (pausable) time.
    struct TokioClock {
        base: NaiveDateTime,
        origin: Instant,
    }

    impl TokioClock {
        fn starting_at(base: NaiveDateTime) -> Self {
            Self {
                base,
                origin: Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> NaiveDateTime {
            self.base + TimeDelta::from_std(self.origin.elapsed()).unwrap()
        }
    }

    /// Answers each request with the next scripted payload, or an error once
    /// the script runs out.
    struct ScriptedSource {
        replies: Mutex<VecDeque<anyhow::Result<serde_json::Value>>>,
        requests: Mutex<Vec<NaiveDate>>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<anyhow::Result<serde_json::Value>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_day(&self, date: NaiveDate) -> anyhow::Result<serde_json::Value> {
            self.requests.lock().unwrap().push(date);
            let reply = self.replies.lock().unwrap().pop_front();
            reply.unwrap_or_else(|| Err(anyhow::anyhow!("404 Not Found")))
        }
    }

    fn start_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 19)
            .unwrap()
            .and_hms_opt(12, 59, 0)
            .unwrap()
    }

    fn payload() -> serde_json::Value {
        json!([
            {"SEK_per_kWh": 0.31, "time_start": "2025-10-20T00:00:00+02:00"},
            {"SEK_per_kWh": 0.52, "time_start": "2025-10-20T01:00:00+02:00"},
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_tomorrow_retries_until_published() {
        let source = ScriptedSource::new(vec![Err(anyhow::anyhow!("404 Not Found")), Ok(payload())]);
        let clock = Arc::new(TokioClock::starting_at(start_time()));
        let scheduler = PriceScheduler::tomorrow(
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            TimeDelta::seconds(60),
        );
        let service = PriceService::new(scheduler, source.clone(), clock.clone());
        let mut board = service.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(service.run(stop_rx));

        board
            .wait_for(|b| b.state == SchedulerState::Retrying)
            .await
            .unwrap();
        assert_eq!(board.borrow().error, Some(PriceError::Unavailable));

        board.wait_for(|b| b.state == SchedulerState::Idle).await.unwrap();
        {
            let board = board.borrow();
            assert_eq!(board.buckets.len(), 2);
            assert_eq!(board.error, None);
        }

        let tomorrow = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        assert_eq!(*source.requests.lock().unwrap(), [tomorrow, tomorrow]);
        assert!(clock.now() >= start_time() + TimeDelta::seconds(120));

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_is_reported() {
        let source = ScriptedSource::new(vec![Ok(json!([]))]);
        let clock = Arc::new(TokioClock::starting_at(start_time()));
        let scheduler = PriceScheduler::today(TimeDelta::seconds(60));
        let service = PriceService::new(scheduler, source.clone(), clock);
        let mut board = service.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(service.run(stop_rx));

        board
            .wait_for(|b| b.state == SchedulerState::Retrying)
            .await
            .unwrap();
        assert_eq!(board.borrow().error, Some(PriceError::NoData));
        assert!(board.borrow().buckets.is_empty());

        drop(stop_tx);
        handle.await.unwrap();
        assert_eq!(source.requests.lock().unwrap().len(), 1);
    }
}
