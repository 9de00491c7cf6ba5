//! Completion-rate sampling and ETA estimation.

use std::fmt;
use std::time::{Duration, Instant};

/// Minimum spacing between two rate samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// What a completion produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// First completion; timing starts here and nothing is reported.
    Started,
    /// Completion between samples: position only.
    Tick { count: usize, total: usize },
    /// Completion that triggered a new rate sample.
    Sample {
        count: usize,
        total: usize,
        /// Completions per second since the previous sample.
        rate: f64,
        /// Completions per second since the first completion.
        average: f64,
        /// Remaining time at `rate`; zero when the rate is zero.
        eta: Duration,
    },
}

impl Progress {
    /// Share of completed tasks in percent.
    pub fn percent(count: usize, total: usize) -> f64 {
        if total == 0 {
            100.0
        } else {
            count as f64 * 100.0 / total as f64
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Progress::Started => write!(f, "started"),
            Progress::Tick { count, total } => {
                write!(f, "({count}/{total}) {:.1}%", Self::percent(count, total))
            }
            Progress::Sample {
                count,
                total,
                rate,
                average,
                eta,
            } => write!(
                f,
                "({count}/{total}) {:.1}% [{rate:.1}/s | avg {average:.1}/s | eta {:.1}s]",
                Self::percent(count, total),
                eta.as_secs_f64()
            ),
        }
    }
}

/// Tracks completions of a run and estimates the time left.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total: usize,
    start: Option<Instant>,
    last_sample: Option<Instant>,
    last_count: usize,
}

impl ProgressEstimator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            start: None,
            last_sample: None,
            last_count: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Time since the first completion.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.start
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
    }

    /// Records that `count` tasks have completed as of `now`.
    pub fn record(&mut self, count: usize, now: Instant) -> Progress {
        let (Some(start), Some(last)) = (self.start, self.last_sample) else {
            self.start = Some(now);
            self.last_sample = Some(now);
            self.last_count = 0;
            return Progress::Started;
        };

        let since_sample = now.saturating_duration_since(last);
        if since_sample < SAMPLE_INTERVAL {
            return Progress::Tick {
                count,
                total: self.total,
            };
        }

        let rate = count.saturating_sub(self.last_count) as f64 / since_sample.as_secs_f64();
        let running = now.saturating_duration_since(start).as_secs_f64();
        let average = if running > 0.0 {
            count as f64 / running
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(count) as f64;
        let eta = if rate > 0.0 {
            Duration::from_secs_f64(remaining / rate)
        } else {
            Duration::ZERO
        };

        self.last_sample = Some(now);
        self.last_count = count;

        Progress::Sample {
            count,
            total: self.total,
            rate,
            average,
            eta,
        }
    }
}
