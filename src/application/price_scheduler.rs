// Price fetch scheduler - When to fetch, retry and clear day-ahead prices
use crate::domain::price::{PriceBucket, PriceError};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDay {
    Today,
    Tomorrow,
}

impl PriceDay {
    pub fn target_date(self, now: NaiveDateTime) -> NaiveDate {
        match self {
            PriceDay::Today => now.date(),
            PriceDay::Tomorrow => now.date() + Days::new(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    #[default]
    WaitingForWindow,
    Fetching,
    Idle,
    Retrying,
}

/// What one scheduler instance currently holds for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBoard {
    pub state: SchedulerState,
    pub date: Option<NaiveDate>,
    pub buckets: Vec<PriceBucket>,
    pub error: Option<PriceError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub date: NaiveDate,
}

// Ordering matters: at equal instants the board is cleared before a fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum WakeupKind {
    ClearBoard,
    FetchWindow,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Wakeup {
    at: NaiveDateTime,
    kind: WakeupKind,
}

/// State machine for one price table. It never reads the clock itself: the
/// caller passes `now` in, sleeps until `next_wakeup`, and reports fetch
/// outcomes through `complete`.
#[derive(Debug, Clone)]
pub struct PriceScheduler {
    day: PriceDay,
    fetch_time: NaiveTime,
    retry_after: TimeDelta,
    wakeups: BinaryHeap<Reverse<Wakeup>>,
    in_flight: Option<NaiveDate>,
    board: PriceBoard,
}

impl PriceScheduler {
    /// Today's prices: fetched on start and again every midnight.
    pub fn today(retry_after: TimeDelta) -> Self {
        Self::new(PriceDay::Today, NaiveTime::MIN, retry_after)
    }

    /// Tomorrow's prices: fetched once they are published at `publish_time`.
    pub fn tomorrow(publish_time: NaiveTime, retry_after: TimeDelta) -> Self {
        Self::new(PriceDay::Tomorrow, publish_time, retry_after)
    }

    fn new(day: PriceDay, fetch_time: NaiveTime, retry_after: TimeDelta) -> Self {
        Self {
            day,
            fetch_time,
            retry_after,
            wakeups: BinaryHeap::new(),
            in_flight: None,
            board: PriceBoard::default(),
        }
    }

    pub fn day(&self) -> PriceDay {
        self.day
    }

    pub fn state(&self) -> SchedulerState {
        self.board.state
    }

    pub fn board(&self) -> &PriceBoard {
        &self.board
    }

    /// Arm the first fetch window and the midnight clear.
    pub fn start(&mut self, now: NaiveDateTime) {
        self.wakeups.clear();
        let first_fetch = match self.day {
            PriceDay::Tomorrow if now.time() < self.fetch_time => {
                now.date().and_time(self.fetch_time)
            }
            _ => now,
        };
        self.schedule(first_fetch, WakeupKind::FetchWindow);
        self.schedule(next_midnight(now), WakeupKind::ClearBoard);
        self.board.state = SchedulerState::WaitingForWindow;
    }

    pub fn next_wakeup(&self) -> Option<NaiveDateTime> {
        self.wakeups.peek().map(|Reverse(wakeup)| wakeup.at)
    }

    /// Fire every wakeup due at `now`. Returns the fetch to perform, if one is
    /// due and none is already in flight.
    pub fn poll(&mut self, now: NaiveDateTime) -> Option<FetchRequest> {
        let mut request = None;
        let mut deferred = Vec::new();

        while let Some(Reverse(wakeup)) = self.wakeups.peek().copied() {
            if wakeup.at > now {
                break;
            }
            self.wakeups.pop();

            match wakeup.kind {
                WakeupKind::ClearBoard => self.clear(wakeup.at),
                WakeupKind::FetchWindow | WakeupKind::Retry => {
                    if self.in_flight.is_some() {
                        deferred.push(wakeup);
                    } else if request.is_none() {
                        request = Some(self.begin_fetch(now));
                    }
                }
            }
        }

        for wakeup in deferred {
            self.wakeups.push(Reverse(wakeup));
        }
        request
    }

    /// Record the outcome of the fetch handed out by `poll`.
    pub fn complete(&mut self, now: NaiveDateTime, outcome: Result<Vec<PriceBucket>, PriceError>) {
        let date = self.in_flight.take();
        self.cancel(|kind| kind == WakeupKind::Retry);

        match outcome {
            Ok(buckets) if !buckets.is_empty() => {
                self.board = PriceBoard {
                    state: SchedulerState::Idle,
                    date,
                    buckets,
                    error: None,
                };
                // a midnight clear during the fetch has already armed the next window
                if self.pending(WakeupKind::FetchWindow) == 0 {
                    let next = self.next_window(now, false);
                    self.schedule(next, WakeupKind::FetchWindow);
                }
            }
            Ok(_) => self.fail(now, PriceError::NoData),
            Err(error) => self.fail(now, error),
        }
    }

    fn begin_fetch(&mut self, now: NaiveDateTime) -> FetchRequest {
        let date = self.day.target_date(now);
        self.in_flight = Some(date);
        self.board.state = SchedulerState::Fetching;
        FetchRequest { date }
    }

    fn fail(&mut self, now: NaiveDateTime, error: PriceError) {
        self.board.state = SchedulerState::Retrying;
        self.board.buckets.clear();
        self.board.error = Some(error);
        self.schedule(now + self.retry_after, WakeupKind::Retry);
    }

    /// Midnight: the table must not outlive its day. Pending retries and windows
    /// belong to the old date and are replaced by the first window of the new one.
    fn clear(&mut self, midnight: NaiveDateTime) {
        self.board.buckets.clear();
        self.board.error = None;
        self.board.date = None;
        if self.in_flight.is_none() {
            self.board.state = SchedulerState::Idle;
        }

        self.cancel(|kind| matches!(kind, WakeupKind::FetchWindow | WakeupKind::Retry));
        let next = self.next_window(midnight, true);
        self.schedule(next, WakeupKind::FetchWindow);
        self.schedule(next_midnight(midnight), WakeupKind::ClearBoard);
    }

    fn schedule(&mut self, at: NaiveDateTime, kind: WakeupKind) {
        self.wakeups.push(Reverse(Wakeup { at, kind }));
    }

    fn cancel(&mut self, matches: impl Fn(WakeupKind) -> bool) {
        self.wakeups.retain(|Reverse(w)| !matches(w.kind));
    }

    /// Next occurrence of this instance's fetch time, at or after `now` when
    /// `inclusive`, strictly after it otherwise.
    fn next_window(&self, now: NaiveDateTime, inclusive: bool) -> NaiveDateTime {
        let candidate = now.date().and_time(self.fetch_time);
        if candidate > now || (inclusive && candidate == now) {
            candidate
        } else {
            candidate + Days::new(1)
        }
    }

    fn pending(&self, kind: WakeupKind) -> usize {
        self.wakeups.iter().filter(|Reverse(w)| w.kind == kind).count()
    }
}

fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    (now.date() + Days::new(1)).and_time(NaiveTime::MIN)
}
