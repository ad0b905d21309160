//! The producer side: a batch of identical messages, paced so the average
//! rate over the batch never exceeds the limit.

use log::{debug, trace};
use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crate::broker::{DeliveryMode, MessageProperties, MessageSink, DEFAULT_EXCHANGE};
use crate::error::{Error, Result};

pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(1);
pub const THROTTLE_STEP: Duration = Duration::from_millis(2);

pub const PRODUCER_BODY: &[u8] = b"Hello from the producer!";
pub const PLACEHOLDER_MESSAGE_ID: &str = " msg_id ";
pub const PRODUCER_CONTENT_TYPE: &str = "text/json";

/// A progress line, printed roughly once a second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub elapsed: Duration,
    pub sent: u64,
    pub since_last: u64,
    pub rate_hz: f64,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ms: Sent {} - {} since last report ({} Hz)",
            self.elapsed.as_millis(),
            self.sent,
            self.since_last,
            self.rate_hz as u64
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub sent: u64,
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Messages per second over the whole batch; 0 when nothing measurable
    /// happened.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.sent as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "PRODUCER - Message count: {}", self.sent)?;
        writeln!(f, "Total time, milliseconds: {}", self.elapsed.as_millis())?;
        write!(f, "Overall messages-per-second: {:.2}", self.rate())
    }
}

/// Counters and checkpoints for one batch.
#[derive(Debug)]
struct Pacer {
    start: Instant,
    sent: u64,
    previous_sent: u64,
    previous_report: Instant,
    next_summary: Instant,
}

impl Pacer {
    fn new(start: Instant) -> Self {
        Pacer {
            start,
            sent: 0,
            previous_sent: 0,
            previous_report: start,
            next_summary: start + SUMMARY_INTERVAL,
        }
    }

    fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Messages per second since the batch started, or `None` while no time
    /// has passed.
    fn overall_rate(&self, now: Instant) -> Option<f64> {
        let secs = now.saturating_duration_since(self.start).as_secs_f64();
        if secs > 0.0 {
            Some(self.sent as f64 / secs)
        } else {
            None
        }
    }

    fn over_limit(&self, now: Instant, rate_limit: f64) -> bool {
        self.overall_rate(now).map_or(false, |rate| rate > rate_limit)
    }

    /// Emits at most one progress report per call, once `now` has passed
    /// the next summary checkpoint.
    fn progress(&mut self, now: Instant) -> Option<Progress> {
        if now <= self.next_summary {
            return None;
        }

        let since_last = self.sent - self.previous_sent;
        let interval = now.saturating_duration_since(self.previous_report).as_secs_f64();
        let rate_hz = if interval > 0.0 {
            since_last as f64 / interval
        } else {
            0.0
        };
        let report = Progress {
            elapsed: now.saturating_duration_since(self.start),
            sent: self.sent,
            since_last,
            rate_hz,
        };

        self.previous_sent = self.sent;
        self.previous_report = now;
        self.next_summary += SUMMARY_INTERVAL;
        Some(report)
    }

    /// Sleeps in small steps until the average rate is back under the limit.
    fn throttle(&self, rate_limit: f64) {
        while self.over_limit(Instant::now(), rate_limit) {
            thread::sleep(THROTTLE_STEP);
        }
    }
}

/// Publishes `message_count` messages to `queue` through the default
/// exchange, never exceeding `rate_limit` messages per second on average.
/// Progress lines and the final summary are written to `out`.
///
/// The first failed publish aborts the batch.
pub fn run_batch<P, W>(
    sink: &mut P,
    queue: &str,
    rate_limit: u32,
    message_count: u64,
    out: &mut W,
) -> Result<BatchSummary>
where
    P: MessageSink,
    W: Write,
{
    if rate_limit == 0 {
        return Err(Error::Configuration(
            "rate limit must be greater than zero".to_string(),
        ));
    }
    let limit = f64::from(rate_limit);

    let properties = MessageProperties::default()
        .with_content_type(PRODUCER_CONTENT_TYPE)
        .with_delivery_mode(DeliveryMode::Persistent)
        .with_message_id(PLACEHOLDER_MESSAGE_ID);

    debug!(
        "Sending {} messages to '{}' at up to {} Hz",
        message_count, queue, rate_limit
    );
    let mut pacer = Pacer::new(Instant::now());

    for _ in 0..message_count {
        sink.publish(DEFAULT_EXCHANGE, queue, &properties, PRODUCER_BODY)?;
        pacer.record_sent();
        trace!("Published message {}", pacer.sent);

        if let Some(report) = pacer.progress(Instant::now()) {
            writeln!(out, "{}", report).map_err(Error::io("Writing progress"))?;
        }

        pacer.throttle(limit);
    }

    let summary = BatchSummary {
        sent: pacer.sent,
        elapsed: pacer.start.elapsed(),
    };
    writeln!(out, "{}", summary).map_err(Error::io("Writing summary"))?;
    Ok(summary)
}
