//! Location-bound recurring fetches.
//!
//! A [`PollSubscription`] keeps one data kind fresh for one location: an
//! immediate fetch on bind, then one per interval until rebound or torn down.
//! A [`PollScheduler`] groups the subscriptions of one consumer and rebinds
//! them all when the location changes.
//!
//! Every fetch is tagged with `(binding, seq)`. Binding a new location bumps
//! `binding` and restarts `seq`; each tick bumps `seq`. A response is delivered
//! only if its tag is still the latest one issued, so a slow answer for an old
//! location (or an older tick) can never overwrite fresher state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Error;
use crate::location::{LocationSelection, LocationStream};
use crate::models::{FloodRisk, Page, Report, WeatherData};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// What a subscription keeps fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Current conditions at the location.
    Weather,
    /// Flood risk assessment for the location.
    FloodRisk,
    /// Approved HIGH and EXTREME reports near the location.
    Alerts,
    /// First page of the public report feed.
    ReportsFeed,
}

impl DataKind {
    pub const ALL: [Self; 4] = [Self::Weather, Self::FloodRisk, Self::Alerts, Self::ReportsFeed];

    /// Refresh period used when a consumer does not pick one.
    #[must_use]
    pub fn default_interval(self) -> Duration {
        match self {
            Self::Weather | Self::FloodRisk => Duration::from_secs(15 * 60),
            Self::Alerts | Self::ReportsFeed => Duration::from_secs(5 * 60),
        }
    }
}

/// A successful fetch; the variant always matches the [`DataKind`] that was
/// requested.
#[derive(Debug, Clone, PartialEq)]
pub enum PollData {
    Weather(WeatherData),
    FloodRisk(FloodRisk),
    Alerts(Vec<Report>),
    ReportsFeed(Page<Report>),
}

/// Source of polled data.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        kind: DataKind,
        location: LocationSelection,
    ) -> impl Future<Output = Result<PollData, Error>> + Send;
}

/// Identifies one issued fetch. See the [module documentation](self).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTag {
    /// Incremented each time the subscription is bound to a location.
    pub binding: u64,
    /// Fetch number within the binding, starting at 1.
    pub seq: u64,
}

/// A fresh result for one kind. Failures are delivered too; they do not stop
/// the schedule.
#[derive(Debug)]
pub struct PollUpdate {
    pub kind: DataKind,
    pub location: LocationSelection,
    pub tag: RequestTag,
    pub result: Result<PollData, Error>,
}

#[derive(Debug, Default)]
struct Tracker {
    binding: u64,
    last_seq: u64,
    live: bool,
}

impl Tracker {
    fn rebind(&mut self) -> u64 {
        self.binding += 1;
        self.last_seq = 0;
        self.live = true;
        self.binding
    }

    fn issue(&mut self, binding: u64) -> Option<RequestTag> {
        if !self.live || binding != self.binding {
            return None;
        }
        self.last_seq += 1;
        Some(RequestTag {
            binding,
            seq: self.last_seq,
        })
    }

    fn is_current(&self, tag: RequestTag) -> bool {
        self.live && tag.binding == self.binding && tag.seq == self.last_seq
    }

    fn close(&mut self) {
        self.live = false;
        self.binding += 1;
    }
}

/// One recurring fetch of one kind, bound to at most one location.
pub struct PollSubscription<F> {
    kind: DataKind,
    interval: Duration,
    location: Option<LocationSelection>,
    tracker: Arc<Mutex<Tracker>>,
    timer: Option<JoinHandle<()>>,
    fetcher: Arc<F>,
    updates: mpsc::UnboundedSender<PollUpdate>,
}

impl<F: Fetcher> PollSubscription<F> {
    #[must_use]
    pub fn new(
        kind: DataKind,
        interval: Duration,
        fetcher: Arc<F>,
        updates: mpsc::UnboundedSender<PollUpdate>,
    ) -> Self {
        Self {
            kind,
            interval: interval.max(MIN_INTERVAL),
            location: None,
            tracker: Arc::new(Mutex::new(Tracker::default())),
            timer: None,
            fetcher,
            updates,
        }
    }

    /// Binds to `location`: cancels the current timer, then fetches
    /// immediately and every interval. Must be called within a tokio runtime.
    pub fn bind(&mut self, location: LocationSelection) {
        self.stop_timer();
        let binding = self.tracker.lock().rebind();

        tracing::debug!(
            kind = ?self.kind,
            binding,
            latitude = location.latitude(),
            longitude = location.longitude(),
            "Binding poll"
        );

        let timer = tokio::spawn(run_timer(BoundPoll {
            kind: self.kind,
            location: location.clone(),
            interval: self.interval,
            binding,
            tracker: self.tracker.clone(),
            fetcher: self.fetcher.clone(),
            updates: self.updates.clone(),
        }));
        self.location = Some(location);
        self.timer = Some(timer);
    }
}

impl<F> PollSubscription<F> {
    #[must_use]
    pub fn kind(&self) -> DataKind {
        self.kind
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn location(&self) -> Option<&LocationSelection> {
        self.location.as_ref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    /// Sequence number of the latest fetch issued for the current binding.
    #[must_use]
    pub fn last_request_seq(&self) -> u64 {
        self.tracker.lock().last_seq
    }

    /// Stops the schedule. Results of fetches still in flight are dropped.
    pub fn cancel(&mut self) {
        self.stop_timer();
        self.tracker.lock().close();
        self.location = None;
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<F> Drop for PollSubscription<F> {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct BoundPoll<F> {
    kind: DataKind,
    location: LocationSelection,
    interval: Duration,
    binding: u64,
    tracker: Arc<Mutex<Tracker>>,
    fetcher: Arc<F>,
    updates: mpsc::UnboundedSender<PollUpdate>,
}

async fn run_timer<F: Fetcher>(poll: BoundPoll<F>) {
    let mut ticker = tokio::time::interval(poll.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if poll.updates.is_closed() {
            break;
        }
        // A timer that lost the race against a rebind issues nothing.
        let Some(tag) = poll.tracker.lock().issue(poll.binding) else {
            break;
        };
        tracing::debug!(kind = ?poll.kind, binding = tag.binding, seq = tag.seq, "Poll tick");

        tokio::spawn(fetch_once(
            poll.kind,
            poll.location.clone(),
            tag,
            poll.tracker.clone(),
            poll.fetcher.clone(),
            poll.updates.clone(),
        ));
    }
}

async fn fetch_once<F: Fetcher>(
    kind: DataKind,
    location: LocationSelection,
    tag: RequestTag,
    tracker: Arc<Mutex<Tracker>>,
    fetcher: Arc<F>,
    updates: mpsc::UnboundedSender<PollUpdate>,
) {
    let result = fetcher.fetch(kind, location.clone()).await;

    // Held while sending so a concurrent rebind cannot slip in between.
    let tracker = tracker.lock();
    if !tracker.is_current(tag) {
        tracing::debug!(kind = ?kind, binding = tag.binding, seq = tag.seq, "Discarding stale response");
        return;
    }
    if let Err(e) = &result {
        tracing::warn!(kind = ?kind, error = %e, "Poll fetch failed");
    }
    let _ = updates.send(PollUpdate {
        kind,
        location,
        tag,
        result,
    });
}

/// The subscriptions of one consumer, all following one location.
///
/// Dropping the scheduler tears every subscription down.
pub struct PollScheduler<F> {
    fetcher: Arc<F>,
    updates: mpsc::UnboundedSender<PollUpdate>,
    subscriptions: HashMap<DataKind, PollSubscription<F>>,
    location: Option<LocationSelection>,
}

impl<F: Fetcher> PollScheduler<F> {
    #[must_use]
    pub fn new(fetcher: Arc<F>) -> (Self, mpsc::UnboundedReceiver<PollUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            fetcher,
            updates,
            subscriptions: HashMap::new(),
            location: None,
        };
        (scheduler, rx)
    }

    /// Starts polling `kind` at its default interval.
    pub fn watch(&mut self, kind: DataKind) {
        self.watch_every(kind, kind.default_interval());
    }

    /// Starts polling `kind` every `interval`, replacing any existing
    /// subscription for it. Polling begins once a location is known.
    pub fn watch_every(&mut self, kind: DataKind, interval: Duration) {
        if let Some(mut previous) = self.subscriptions.remove(&kind) {
            previous.cancel();
        }
        let mut subscription =
            PollSubscription::new(kind, interval, self.fetcher.clone(), self.updates.clone());
        if let Some(location) = &self.location {
            subscription.bind(location.clone());
        }
        self.subscriptions.insert(kind, subscription);
    }

    /// Rebinds every subscription to `location`. A location equal to the
    /// current one changes nothing.
    pub fn set_location(&mut self, location: LocationSelection) {
        if self.location.as_ref() == Some(&location) {
            return;
        }
        for subscription in self.subscriptions.values_mut() {
            subscription.bind(location.clone());
        }
        self.location = Some(location);
    }

    /// Rebinds on every selection from `locations` until the stream ends or
    /// the returned task is aborted; either way the scheduler is dropped and
    /// all its timers stop.
    #[must_use]
    pub fn follow(mut self, mut locations: LocationStream) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(location) = locations.next().await {
                self.set_location(location);
            }
        })
    }
}

impl<F> PollScheduler<F> {
    /// Stops polling `kind`. Nothing more is delivered for it, including
    /// results of fetches already in flight.
    pub fn unwatch(&mut self, kind: DataKind) {
        if let Some(mut subscription) = self.subscriptions.remove(&kind) {
            subscription.cancel();
        }
    }

    #[must_use]
    pub fn is_watching(&self, kind: DataKind) -> bool {
        self.subscriptions.contains_key(&kind)
    }

    #[must_use]
    pub fn location(&self) -> Option<&LocationSelection> {
        self.location.as_ref()
    }

    #[must_use]
    pub fn subscription(&self, kind: DataKind) -> Option<&PollSubscription<F>> {
        self.subscriptions.get(&kind)
    }

    /// Cancels every subscription; the consumer is going away.
    pub fn teardown(&mut self) {
        for (_, mut subscription) in self.subscriptions.drain() {
            subscription.cancel();
        }
        self.location = None;
    }
}
