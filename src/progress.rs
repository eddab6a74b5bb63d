//! Sweep progress and remaining-time estimate.

use std::time::{Duration, Instant};
use tracing::info;

/// Counts results against the sweep total.
///
/// The estimate only uses results produced in this run, so resumed work does
/// not inflate the rate.
#[derive(Debug, Clone)]
pub struct Progress {
    total: usize,
    done: usize,
    produced: usize,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize, already_done: usize) -> Self {
        Self {
            total,
            done: already_done.min(total),
            produced: 0,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self) {
        self.produced += 1;
        self.done = (self.done + 1).min(self.total);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn produced(&self) -> usize {
        self.produced
    }

    pub fn remaining(&self) -> usize {
        self.total - self.done
    }

    pub fn eta(&self) -> Option<Duration> {
        self.eta_after(self.started.elapsed())
    }

    /// `remaining / (produced / elapsed)`, unknown until something was produced.
    pub fn eta_after(&self, elapsed: Duration) -> Option<Duration> {
        if self.produced == 0 {
            return None;
        }
        let per_result = elapsed.as_secs_f64() / self.produced as f64;
        Some(Duration::from_secs_f64(per_result * self.remaining() as f64))
    }

    pub fn log(&self) {
        let percent = if self.total == 0 {
            100.0
        } else {
            self.done as f64 * 100.0 / self.total as f64
        };
        match self.eta() {
            Some(eta) => info!(
                done = self.done,
                total = self.total,
                this_run = self.produced(),
                "{:.1}% complete, about {} remaining",
                percent,
                format_duration(eta)
            ),
            None => info!(done = self.done, total = self.total, "{:.1}% complete", percent),
        }
    }
}

/// `1h 02m 03s`, `4m 05s` or `6s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
