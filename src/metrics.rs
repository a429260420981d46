//! Time-windowed counter store and the periodic reporter.
//!
//! Counters accumulate into fixed-size intervals (default 5 s granularity,
//! one minute of retention). The reporter prints the interval that just
//! closed, as zeros when it recorded nothing, so idle periods are visible
//! in the log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The four traffic counters. AO is application-originated (outbound),
/// AT is application-terminated (inbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Every outbound submission response, regardless of its status.
    Submit,
    /// Outbound responses carrying a non-zero status, counted in addition
    /// to [`Submit`](Counter::Submit).
    SubmitFailure,
    /// Every inbound delivery.
    Deliver,
    /// Inbound deliveries carrying a non-zero status, counted in addition
    /// to [`Deliver`](Counter::Deliver).
    DeliverFailure,
}

impl Counter {
    pub const ALL: [Counter; 4] = [
        Counter::Submit,
        Counter::SubmitFailure,
        Counter::Deliver,
        Counter::DeliverFailure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::Submit => "ao",
            Counter::SubmitFailure => "ao failure",
            Counter::Deliver => "at",
            Counter::DeliverFailure => "at failure",
        }
    }

    fn index(self) -> usize {
        match self {
            Counter::Submit => 0,
            Counter::SubmitFailure => 1,
            Counter::Deliver => 2,
            Counter::DeliverFailure => 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Interval {
    start: DateTime<Utc>,
    counts: [u64; 4],
}

/// A read-only copy of one interval's counters.
#[derive(Debug, Clone)]
pub struct IntervalSnapshot {
    pub start: DateTime<Utc>,
    counts: [u64; 4],
}

impl IntervalSnapshot {
    /// Count for `counter`, zero if nothing was recorded.
    pub fn get(&self, counter: Counter) -> u64 {
        self.counts[counter.index()]
    }

    fn report_line(&self) -> String {
        let mut line = self.start.to_rfc3339();
        for counter in Counter::ALL {
            line.push_str(&format!(" {}:{} ", counter.name(), self.get(counter)));
        }
        line
    }
}

/// Shared, internally synchronized counter sink. Written by every session
/// worker, read by the periodic reporter.
#[derive(Debug)]
pub struct MetricsSink {
    granularity: Duration,
    max_intervals: usize,
    intervals: Mutex<VecDeque<Interval>>,
}

impl MetricsSink {
    /// `granularity` is the interval length, `retention` how much history to
    /// keep.
    pub fn new(granularity: Duration, retention: Duration) -> Self {
        let max_intervals =
            (retention.as_millis() / granularity.as_millis().max(1)).max(1) as usize;
        Self {
            granularity,
            max_intervals,
            intervals: Mutex::new(VecDeque::new()),
        }
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// Add one to `counter` in the current interval.
    pub fn increment(&self, counter: Counter) {
        let mut intervals = self.intervals.lock().expect("metrics mutex poisoned");
        let start = self.current_interval_start();
        match intervals.back_mut() {
            Some(last) if last.start == start => {
                last.counts[counter.index()] += 1;
            }
            _ => {
                let mut counts = [0u64; 4];
                counts[counter.index()] = 1;
                intervals.push_back(Interval { start, counts });
                while intervals.len() > self.max_intervals {
                    intervals.pop_front();
                }
            }
        }
    }

    /// All retained intervals, oldest first, including the in-progress one.
    pub fn snapshot(&self) -> Vec<IntervalSnapshot> {
        let intervals = self.intervals.lock().expect("metrics mutex poisoned");
        intervals
            .iter()
            .map(|i| IntervalSnapshot {
                start: i.start,
                counts: i.counts,
            })
            .collect()
    }

    /// The interval the reporter should print: the one that just closed.
    /// When nothing was recorded in it, a zero snapshot is reported so a
    /// traffic stop shows up as zeros rather than a repeat of the last
    /// active interval. Before the first boundary ever passes, the single
    /// in-progress interval is reported as-is.
    pub fn report_interval(&self) -> Option<IntervalSnapshot> {
        let data = self.snapshot();
        if data.is_empty() {
            return None;
        }
        let current = self.current_interval_start();
        let gran_ms = self.granularity.as_millis().max(1) as i64;
        let completed = current - chrono::Duration::milliseconds(gran_ms);
        if let Some(found) = data.iter().find(|i| i.start == completed) {
            return Some(found.clone());
        }
        if data.len() == 1 && data[0].start == current {
            return Some(data[0].clone());
        }
        Some(IntervalSnapshot {
            start: completed,
            counts: [0; 4],
        })
    }

    // Interval starts are aligned to granularity multiples of the epoch so
    // all writers agree on the current bucket.
    fn current_interval_start(&self) -> DateTime<Utc> {
        let gran_ms = self.granularity.as_millis().max(1) as i64;
        let now_ms = Utc::now().timestamp_millis();
        let aligned = now_ms - now_ms.rem_euclid(gran_ms);
        Utc.timestamp_millis_opt(aligned).single().unwrap_or_else(Utc::now)
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60))
    }
}

/// Spawn the reporter task: one log line per interval with the four counters.
pub fn spawn_reporter(
    sink: Arc<MetricsSink>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sink.granularity());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(interval) = sink.report_interval() {
                        info!("{}", interval.report_line());
                    }
                }
            }
        }
    })
}
