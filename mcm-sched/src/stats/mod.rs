/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Write statistics for the outbound channel.
//!
//! Every transmission is attributed to one [`SendPath`].  For each path the
//! scheduler accumulates call outcomes and where the time went:
//!
//! ```text
//! call ──► lock wait ──► cooldown wait ──► write ──► done
//!          time_blocked_   time_blocked_    time_in_successful_writes /
//!          on_lock /       on_cooldown      time_in_failed_writes
//!          on_timed_lock
//! ```
//!
//! Lock time is split by whether the caller gave the acquisition a timeout.
//!
//! Statistics live inside the scheduler's coordination lock, so recording is
//! plain field arithmetic.  [`Scheduler::stats`](crate::Scheduler::stats)
//! hands out a cloned snapshot.

pub mod capacity;

pub use capacity::{CapacityMonitor, UsageSample};

use std::time::Duration;

use serde::Serialize;

// ── Send path ─────────────────────────────────────────────────────────────────

/// Which scheduler entry point issued a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPath {
    /// `send_immediate` (queue bypass).
    Immediate,
    /// Any `send_next*` / `try_send_next` call.
    Scheduled,
    /// A caller holding the exclusive channel borrow.
    Exclusive,
}

// ── Per-path counters ─────────────────────────────────────────────────────────

/// Time one call spent before it could write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Waits {
    pub lock: Duration,
    /// The lock was taken with a timeout.
    pub timed: bool,
    pub cooldown: Duration,
}

/// Accumulated outcomes and timings for one [`SendPath`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteStats {
    pub successful_writes: u64,
    pub failed_writes: u64,
    /// Calls with a timeout that ran out before they could transmit.
    pub timed_out_calls: u64,
    /// `try_send_next` calls that found nothing ready.  They never wait, so
    /// they are not timeouts.
    pub not_ready_calls: u64,
    /// Cancellable calls that observed cancellation.
    pub cancelled_calls: u64,
    pub bytes_transferred: u64,

    /// Lock time of acquisitions without a timeout.
    pub time_blocked_on_lock: Duration,
    /// Lock time of acquisitions bounded by a timeout.
    pub time_blocked_on_timed_lock: Duration,
    pub time_blocked_on_cooldown: Duration,
    pub time_in_successful_writes: Duration,
    pub time_in_failed_writes: Duration,
}

impl WriteStats {
    /// Total number of attempted writes.
    pub fn writes(&self) -> u64 {
        self.successful_writes + self.failed_writes
    }

    pub(crate) fn record_waits(&mut self, waits: Waits) {
        if waits.timed {
            self.time_blocked_on_timed_lock += waits.lock;
        } else {
            self.time_blocked_on_lock += waits.lock;
        }
        self.time_blocked_on_cooldown += waits.cooldown;
    }

    pub(crate) fn record_write(&mut self, bytes: usize, elapsed: Duration, ok: bool) {
        if ok {
            self.successful_writes += 1;
            self.bytes_transferred += bytes as u64;
            self.time_in_successful_writes += elapsed;
        } else {
            self.failed_writes += 1;
            self.time_in_failed_writes += elapsed;
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Snapshot of all scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub immediate: WriteStats,
    pub scheduled: WriteStats,
    pub exclusive: WriteStats,

    /// Exclusive borrows granted.  Writes through a borrow are counted in
    /// `exclusive` only when bytes were written or the holder panicked.
    pub exclusive_borrows: u64,
    /// Total time the channel was held by exclusive borrows.
    pub time_held_exclusive: Duration,

    /// Total messages accepted by `enqueue*`.
    pub total_enqueued: u64,
    /// Messages discarded by `drop_all_pending`.
    pub total_dropped: u64,
    /// Highest pending count observed.
    pub peak_pending: usize,
}

impl SchedulerStats {
    pub fn path(&self, path: SendPath) -> &WriteStats {
        match path {
            SendPath::Immediate => &self.immediate,
            SendPath::Scheduled => &self.scheduled,
            SendPath::Exclusive => &self.exclusive,
        }
    }

    pub(crate) fn path_mut(&mut self, path: SendPath) -> &mut WriteStats {
        match path {
            SendPath::Immediate => &mut self.immediate,
            SendPath::Scheduled => &mut self.scheduled,
            SendPath::Exclusive => &mut self.exclusive,
        }
    }

    /// Sum of successful writes over all paths.
    pub fn total_successful_writes(&self) -> u64 {
        self.immediate.successful_writes
            + self.scheduled.successful_writes
            + self.exclusive.successful_writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_write_splits_success_and_failure() {
        let mut stats = WriteStats::default();
        let ms = Duration::from_millis;

        stats.record_waits(Waits {
            lock: ms(1),
            timed: false,
            cooldown: ms(10),
        });
        stats.record_write(6, ms(2), true);
        stats.record_waits(Waits {
            lock: ms(4),
            timed: true,
            cooldown: ms(5),
        });
        stats.record_write(6, ms(3), false);

        assert_eq!(stats.successful_writes, 1);
        assert_eq!(stats.failed_writes, 1);
        assert_eq!(stats.writes(), 2);
        // Failed writes do not count as transferred bytes.
        assert_eq!(stats.bytes_transferred, 6);
        assert_eq!(stats.time_blocked_on_lock, ms(1));
        assert_eq!(stats.time_blocked_on_timed_lock, ms(4));
        assert_eq!(stats.time_blocked_on_cooldown, ms(15));
        assert_eq!(stats.time_in_successful_writes, ms(2));
        assert_eq!(stats.time_in_failed_writes, ms(3));
    }

    #[test]
    fn path_accessors_address_the_same_counters() {
        let mut stats = SchedulerStats::default();
        stats.path_mut(SendPath::Exclusive).successful_writes = 3;
        stats.path_mut(SendPath::Immediate).successful_writes = 2;

        assert_eq!(stats.path(SendPath::Exclusive).successful_writes, 3);
        assert_eq!(stats.total_successful_writes(), 5);
    }
}
