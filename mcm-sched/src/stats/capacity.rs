/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Channel capacity monitor.
//!
//! Splits wall-clock time into "in use" (a write or an exclusive borrow is in
//! progress) and "idle" since the start of the current window.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Busy/idle split for one observation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSample {
    pub time_in_use: Duration,
    pub time_idle: Duration,
}

impl UsageSample {
    /// Fraction of the window the channel was busy, `0.0..=1.0`.
    ///
    /// An empty window reports `0.0`.
    pub fn utilisation(&self) -> f64 {
        let total = self.time_in_use + self.time_idle;
        if total.is_zero() {
            return 0.0;
        }
        self.time_in_use.as_secs_f64() / total.as_secs_f64()
    }
}

#[derive(Debug)]
pub struct CapacityMonitor {
    in_use: bool,
    since: Instant,
    time_in_use: Duration,
    time_idle: Duration,
}

impl Default for CapacityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityMonitor {
    /// Start a window with the channel idle.
    pub fn new() -> Self {
        Self {
            in_use: false,
            since: Instant::now(),
            time_in_use: Duration::ZERO,
            time_idle: Duration::ZERO,
        }
    }

    /// Mark the channel busy.  No-op if already busy.
    pub fn mark_in_use(&mut self) {
        self.transition(true, Instant::now());
    }

    /// Mark the channel idle.  No-op if already idle.
    pub fn mark_idle(&mut self) {
        self.transition(false, Instant::now());
    }

    /// Usage so far in the current window, including the open interval.
    pub fn sample(&self) -> UsageSample {
        self.sample_at(Instant::now())
    }

    /// Return the current window's sample and open a new window.
    ///
    /// The busy/idle state carries over into the new window.
    pub fn reset(&mut self) -> UsageSample {
        let now = Instant::now();
        let sample = self.sample_at(now);
        self.time_in_use = Duration::ZERO;
        self.time_idle = Duration::ZERO;
        self.since = now;
        sample
    }

    fn transition(&mut self, in_use: bool, now: Instant) {
        if self.in_use == in_use {
            return;
        }
        self.close_interval(now);
        self.in_use = in_use;
    }

    fn close_interval(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.since);
        if self.in_use {
            self.time_in_use += elapsed;
        } else {
            self.time_idle += elapsed;
        }
        self.since = now;
    }

    fn sample_at(&self, now: Instant) -> UsageSample {
        let open = now.saturating_duration_since(self.since);
        let (mut time_in_use, mut time_idle) = (self.time_in_use, self.time_idle);
        if self.in_use {
            time_in_use += open;
        } else {
            time_idle += open;
        }
        UsageSample {
            time_in_use,
            time_idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zero_utilisation() {
        let sample = UsageSample {
            time_in_use: Duration::ZERO,
            time_idle: Duration::ZERO,
        };
        assert_eq!(sample.utilisation(), 0.0);
    }

    #[test]
    fn utilisation_is_busy_fraction() {
        let sample = UsageSample {
            time_in_use: Duration::from_millis(25),
            time_idle: Duration::from_millis(75),
        };
        assert!((sample.utilisation() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn busy_interval_is_accounted() {
        let mut monitor = CapacityMonitor::new();
        monitor.mark_in_use();
        std::thread::sleep(Duration::from_millis(20));
        monitor.mark_idle();

        let sample = monitor.sample();
        assert!(sample.time_in_use >= Duration::from_millis(20));
    }

    #[test]
    fn repeated_marks_are_idempotent() {
        let mut monitor = CapacityMonitor::new();
        monitor.mark_in_use();
        std::thread::sleep(Duration::from_millis(10));
        monitor.mark_in_use(); // must not close the open busy interval as idle
        let sample = monitor.sample();
        assert!(sample.time_in_use >= Duration::from_millis(10));
    }

    #[test]
    fn reset_starts_a_fresh_window() {
        let mut monitor = CapacityMonitor::new();
        monitor.mark_in_use();
        std::thread::sleep(Duration::from_millis(10));
        let first = monitor.reset();
        assert!(first.time_in_use >= Duration::from_millis(10));

        let second = monitor.sample();
        assert!(second.time_in_use < first.time_in_use + Duration::from_millis(10));
        assert_eq!(second.time_idle, Duration::ZERO);
    }
}
