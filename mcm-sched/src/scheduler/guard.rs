/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scoped exclusive borrow of the outbound channel.

use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use parking_lot::MutexGuard;
use tracing::debug;

use super::State;
use crate::stats::Waits;

/// Sole ownership of the channel, returned by
/// [`Scheduler::acquire_channel_exclusive`](super::Scheduler::acquire_channel_exclusive).
///
/// Holds the scheduler's coordination lock: no enqueue, send or consumer can
/// proceed until the guard is dropped.  Dropping it (normally, on an early
/// return or while unwinding) releases the lock and restarts the cooldown
/// clock, so the first write after a bulk transfer is spaced like any other.
///
/// Writes through the guard's own [`Write`] impl are counted in the
/// exclusive-path statistics; `DerefMut` gives raw access to the channel for
/// anything else (port settings, reads).
pub struct ChannelGuard<'a, W> {
    state: MutexGuard<'a, State<W>>,
    acquired: Instant,
    waits: Waits,
    bytes_written: usize,
}

impl<'a, W> ChannelGuard<'a, W> {
    pub(super) fn new(state: MutexGuard<'a, State<W>>, waits: Waits) -> Self {
        Self {
            state,
            acquired: Instant::now(),
            waits,
            bytes_written: 0,
        }
    }

    /// Bytes written through this guard so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

impl<W> Deref for ChannelGuard<'_, W> {
    type Target = W;

    fn deref(&self) -> &W {
        &self.state.channel
    }
}

impl<W> DerefMut for ChannelGuard<'_, W> {
    fn deref_mut(&mut self) -> &mut W {
        &mut self.state.channel
    }
}

impl<W: Write> Write for ChannelGuard<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.state.channel.write(buf)?;
        self.bytes_written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.channel.flush()
    }
}

impl<W> Drop for ChannelGuard<'_, W> {
    fn drop(&mut self) {
        let now = Instant::now();
        let held = now.saturating_duration_since(self.acquired);
        let completed = !std::thread::panicking();

        let state = &mut *self.state;
        state.last_transmit = Some(now);
        state.capacity.mark_idle();
        state.stats.exclusive_borrows += 1;
        state.stats.time_held_exclusive += held;
        state.stats.exclusive.record_waits(self.waits);
        // A borrow that only reconfigured the port is not a write.
        if self.bytes_written > 0 || !completed {
            state
                .stats
                .exclusive
                .record_write(self.bytes_written, held, completed);
        }

        debug!(
            held_ms = held.as_millis() as u64,
            bytes = self.bytes_written,
            completed,
            "ChannelGuard: exclusive channel access released"
        );
    }
}
