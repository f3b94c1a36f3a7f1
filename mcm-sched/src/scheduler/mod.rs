/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Outbound message scheduler.
//!
//! [`Scheduler`] arbitrates a single byte channel (normally the controller's
//! serial port) between many producers.  It enforces a minimum cooldown
//! between any two writes, because the controller cannot absorb back-to-back
//! packets, and offers three ways onto the wire:
//!
//! | Path | Entry points | Ordering |
//! |---|---|---|
//! | Immediate | [`send_immediate`](Scheduler::send_immediate) | bypasses the queue |
//! | Scheduled | [`enqueue`](Scheduler::enqueue) + `send_next*` | strict priority, FIFO within a level |
//! | Exclusive | [`acquire_channel_exclusive`](Scheduler::acquire_channel_exclusive) | raw access, everything else waits |
//!
//! # Locking
//! One coordination lock guards the queue map, the cooldown clock, the
//! channel and the statistics.  The pending count is mirrored into an atomic
//! that is only written while the lock is held, so it always equals the sum
//! of queue lengths and [`has_pending`](Scheduler::has_pending) can read it
//! without blocking.
//!
//! Nobody sleeps while holding the lock.  The lock is held for a write or for
//! an exclusive borrow, never for a cooldown wait, so `enqueue` only ever
//! waits behind one of those two.  Callers with a timeout or a cancellation
//! token take it with a bounded `try_lock_*`.
//!
//! # Waiting
//! Waiters release the lock and park on a [`Wakeup`] generation counter
//! (blocking callers) or on a `Notify` (async callers).  Both are poked on
//! enqueue, on a cooldown change and when a bypass caller gets its slot:
//!
//! ```text
//!             readiness() ──Ready──► transmit_next()
//!                 │
//!      Empty / Yielding ──┴── CoolingUntil(t)
//!        │                        │
//!  blocking: Wakeup::wait     blocking: Wakeup::wait(.., t)
//!  async:    Notify           async:    Notify | sleep_until(t)
//! ```
//!
//! Immediate sends and exclusive borrows wait out the cooldown without the
//! lock.  While one of them is waiting, queued messages yield, so the bypass
//! caller still gets the next slot on the wire.
//!
//! A continuous stream at a high priority starves lower levels.  That is the
//! observed behaviour of the controller application and is kept as is.

pub mod error;
pub mod guard;
pub mod queue;

pub use error::{ArgumentReason, SchedulerError};
pub use guard::ChannelGuard;
pub use queue::PriorityQueues;

use std::io::Write;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::message::{Message, Priority, IMMEDIATE_PRIORITY};
use crate::stats::{CapacityMonitor, SchedulerStats, SendPath, UsageSample, Waits};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Upper bound for the cooldown setting.  Larger values are clamped.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(3600);

/// How often a cancellable wait re-checks its token while parked on the
/// wake-up counter or the coordination lock.  Neither has a cancellation
/// hook.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

// ── Internal state types ──────────────────────────────────────────────────────

/// Everything behind the coordination lock.
struct State<W> {
    queues: PriorityQueues,

    /// End of the most recent write (or exclusive borrow).  `None` until the
    /// first transmission.
    last_transmit: Option<Instant>,

    channel: W,
    stats: SchedulerStats,
    capacity: CapacityMonitor,
}

/// What a consumer may do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// Nothing queued.
    Empty,
    /// A message is queued but an immediate send or exclusive borrow is
    /// waiting for the same slot.
    Yielding,
    /// A message is queued but the cooldown runs until the given instant.
    CoolingUntil(Instant),
    /// A message is queued and the cooldown has elapsed.
    Ready,
}

/// How a blocking consumer waits.
#[derive(Clone, Copy)]
enum Wait<'t> {
    /// `try_send_next`: take the lock, then give up on anything not ready.
    Poll(Instant),
    /// `send_next_blocking`: everything, lock included, bounded by a deadline.
    Until(Instant),
    /// `send_next_cancellable`: unbounded but cancellable.
    Cancellable(&'t CancellationToken),
    /// `send_next_blocking` with a timeout too large to represent.
    Forever,
}

impl Wait<'_> {
    fn deadline(self) -> Option<Instant> {
        match self {
            Wait::Poll(t) | Wait::Until(t) => Some(t),
            Wait::Cancellable(_) | Wait::Forever => None,
        }
    }
}

/// Generation counter that blocking waiters park on instead of the
/// coordination lock.
///
/// A waiter reads [`current`](Self::current) before it checks whether it can
/// proceed, releases the coordination lock, then calls [`wait`](Self::wait).
/// Any [`bump`](Self::bump) after the read wakes it, so no notification is
/// lost in between.  Lock order is coordination lock first, then this one.
#[derive(Default)]
struct Wakeup {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Wakeup {
    fn current(&self) -> u64 {
        *self.generation.lock()
    }

    fn bump(&self) {
        *self.generation.lock() += 1;
        self.changed.notify_all();
    }

    /// Park until the generation moves past `seen` or `until` passes.
    fn wait(&self, seen: u64, until: Option<Instant>) {
        let mut generation = self.generation.lock();
        while *generation == seen {
            match until {
                Some(t) => {
                    if self.changed.wait_until(&mut generation, t).timed_out() {
                        return;
                    }
                }
                None => self.changed.wait(&mut generation),
            }
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Priority scheduler for one outbound channel `W`.
///
/// Share it between producers and consumers behind an `Arc`.
pub struct Scheduler<W> {
    state: Mutex<State<W>>,

    /// Wakes blocking waiters.
    wakeup: Wakeup,

    /// Wakes async consumers.
    notify: Notify,

    /// Mirror of `state.queues.len()`, written under the lock.
    pending: AtomicUsize,

    /// Cooldown in nanoseconds, read fresh before every wait.
    cooldown_ns: AtomicU64,

    /// Immediate sends and exclusive acquisitions waiting for their slot.
    /// Queued messages yield while this is non-zero.
    bypass_waiters: AtomicUsize,

    /// Timed exclusive acquisitions that gave up.  Kept outside the lock
    /// because the caller never obtained it.
    exclusive_timeouts: AtomicU64,

    /// `send_next_blocking` calls whose deadline passed while the lock was
    /// busy.  Outside the lock for the same reason.
    lock_timeouts: AtomicU64,

    /// Cancelled `send_next_cancellable` / `send_next_async` calls.
    cancelled_sends: AtomicU64,
}

impl<W: Write + Send> Scheduler<W> {
    /// Create a scheduler that owns `channel` and spaces writes `cooldown`
    /// apart.
    pub fn new(channel: W, cooldown: Duration) -> Self {
        let cooldown = Self::clamp_cooldown(cooldown);
        info!(
            cooldown_ms = cooldown.as_millis() as u64,
            "Scheduler::new: outbound scheduler created"
        );
        Self {
            state: Mutex::new(State {
                queues: PriorityQueues::new(),
                last_transmit: None,
                channel,
                stats: SchedulerStats::default(),
                capacity: CapacityMonitor::new(),
            }),
            wakeup: Wakeup::default(),
            notify: Notify::new(),
            pending: AtomicUsize::new(0),
            cooldown_ns: AtomicU64::new(cooldown.as_nanos() as u64),
            bypass_waiters: AtomicUsize::new(0),
            exclusive_timeouts: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            cancelled_sends: AtomicU64::new(0),
        }
    }

    /// Create a scheduler from a loaded [`SchedulerConfig`].
    pub fn from_config(channel: W, config: &SchedulerConfig) -> Self {
        Self::new(channel, config.cooldown())
    }

    /// Consume the scheduler and hand back the channel.  Queued messages are
    /// discarded.
    pub fn into_channel(self) -> W {
        self.state.into_inner().channel
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Current cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_nanos(self.cooldown_ns.load(Ordering::Acquire))
    }

    /// Change the cooldown.  Takes effect at the next wait, including waits
    /// already in progress: every waiter is woken to re-read it.
    pub fn set_cooldown(&self, cooldown: Duration) {
        let cooldown = Self::clamp_cooldown(cooldown);
        self.cooldown_ns
            .store(cooldown.as_nanos() as u64, Ordering::Release);
        debug!(
            cooldown_ms = cooldown.as_millis() as u64,
            "Scheduler::set_cooldown"
        );
        self.wake_all();
    }

    fn clamp_cooldown(cooldown: Duration) -> Duration {
        if cooldown > MAX_COOLDOWN {
            warn!(
                requested_ms = cooldown.as_millis() as u64,
                max_ms = MAX_COOLDOWN.as_millis() as u64,
                "cooldown clamped"
            );
            return MAX_COOLDOWN;
        }
        cooldown
    }

    // ── Producers ─────────────────────────────────────────────────────────────

    /// Send `payload` immediately if `priority` is [`IMMEDIATE_PRIORITY`],
    /// otherwise queue a copy of it.
    pub fn send(&self, payload: &[u8], priority: Priority) -> Result<(), SchedulerError> {
        if priority == IMMEDIATE_PRIORITY {
            self.send_immediate(payload)
        } else {
            self.enqueue(payload, priority)
        }
    }

    /// Write `payload` now, bypassing the queue.
    ///
    /// Waits out the remaining cooldown without holding the coordination
    /// lock; queued messages yield meanwhile, so none can slip in ahead.
    ///
    /// # Errors
    /// * [`SchedulerError::InvalidArgument`] for an empty payload.
    /// * [`SchedulerError::Io`] if the write fails.
    pub fn send_immediate(&self, payload: &[u8]) -> Result<(), SchedulerError> {
        if payload.is_empty() {
            return Err(ArgumentReason::EmptyPayload.into());
        }

        let Some((mut state, waits)) = self.lock_for_bypass(None) else {
            unreachable!("untimed bypass acquisition cannot time out");
        };

        debug!(len = payload.len(), "Scheduler::send_immediate: writing");
        self.transmit(&mut state, payload, SendPath::Immediate, waits)
    }

    /// Queue a copy of `payload` at `priority`.  Never waits on the cooldown.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidArgument`] for an empty payload; the pending
    /// count is left untouched.
    pub fn enqueue(&self, payload: &[u8], priority: Priority) -> Result<(), SchedulerError> {
        let message = Message::copied(payload)?;
        self.enqueue_message(message, priority);
        Ok(())
    }

    /// Queue `buf[range]` at `priority` without copying.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidArgument`] if the range is empty or does not
    /// fit in `buf`.
    pub fn enqueue_shared(
        &self,
        buf: Arc<[u8]>,
        range: Range<usize>,
        priority: Priority,
    ) -> Result<(), SchedulerError> {
        let message = Message::shared(buf, range)?;
        self.enqueue_message(message, priority);
        Ok(())
    }

    /// Queue an already validated [`Message`].
    pub fn enqueue_message(&self, message: Message, priority: Priority) {
        let len = message.len();
        let pending = {
            let mut state = self.state.lock();
            state.queues.push(priority, message);
            let pending = state.queues.len();
            self.pending.store(pending, Ordering::Release);
            state.stats.total_enqueued += 1;
            state.stats.peak_pending = state.stats.peak_pending.max(pending);
            pending
        };

        debug!(priority, len, pending, "Scheduler::enqueue: queued");
        self.wake_all();
    }

    // ── Queue inspection & housekeeping ───────────────────────────────────────

    /// Snapshot: is anything queued?  Informational only, may be stale by the
    /// time the caller acts on it.
    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Snapshot of the number of queued messages.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Priority levels currently in the map, highest first.
    pub fn levels(&self) -> Vec<Priority> {
        self.state.lock().queues.levels()
    }

    /// Discard every queued message without transmitting.  The cooldown
    /// clock is not touched.  Returns how many messages were dropped.
    pub fn drop_all_pending(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.queues.clear();
        self.pending.store(0, Ordering::Release);
        state.stats.total_dropped += dropped as u64;
        drop(state);

        info!(dropped, "Scheduler::drop_all_pending: queues purged");
        dropped
    }

    /// Remove empty priority levels other than the default one.  Returns how
    /// many levels were removed.
    pub fn compact(&self) -> usize {
        let removed = self.state.lock().queues.compact();
        debug!(removed, "Scheduler::compact");
        removed
    }

    // ── Consumers: blocking ───────────────────────────────────────────────────

    /// Transmit one queued message if one is queued and the cooldown has
    /// elapsed; never waits on either.
    ///
    /// It does wait for the coordination lock, so it blocks while the channel
    /// is exclusively borrowed or mid-write.
    pub fn try_send_next(&self) -> Result<bool, SchedulerError> {
        self.send_next_parked(Wait::Poll(Instant::now()))
    }

    /// Wait up to `timeout` for the lock, a message and its cooldown, then
    /// transmit it.
    ///
    /// Returns `Ok(false)` when the timeout elapses first.  If a message is
    /// queued but its cooldown ends after the timeout, returns `Ok(false)`
    /// straight away without consuming it.
    pub fn send_next_blocking(&self, timeout: Duration) -> Result<bool, SchedulerError> {
        let wait = match Instant::now().checked_add(timeout) {
            Some(deadline) => Wait::Until(deadline),
            None => Wait::Forever,
        };
        self.send_next_parked(wait)
    }

    /// Wait until a message can be transmitted, or until `token` is
    /// cancelled.
    ///
    /// # Errors
    /// [`SchedulerError::Cancelled`] if the token fires first; nothing is
    /// dequeued in that case.
    pub fn send_next_cancellable(&self, token: &CancellationToken) -> Result<(), SchedulerError> {
        self.send_next_parked(Wait::Cancellable(token)).map(|_| ())
    }

    /// Shared blocking loop.  The lock is dropped before every park.
    fn send_next_parked(&self, wait: Wait<'_>) -> Result<bool, SchedulerError> {
        let deadline = wait.deadline();
        let token = match wait {
            Wait::Cancellable(token) => Some(token),
            _ => None,
        };
        let mut waits = Waits {
            timed: deadline.is_some(),
            ..Waits::default()
        };

        loop {
            let started = Instant::now();
            let Some(mut state) = self.lock_for_consumer(wait)? else {
                self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                return Ok(false);
            };
            waits.lock += started.elapsed();

            if token.is_some_and(CancellationToken::is_cancelled) {
                return Err(self.cancelled());
            }

            // Read before the readiness check: a bump racing with it must
            // still wake the park below.
            let seen = self.wakeup.current();
            let now = Instant::now();
            let readiness = self.readiness(&state, now);
            let wake_at = match readiness {
                Readiness::Ready => {
                    self.transmit_next(&mut state, waits)?;
                    return Ok(true);
                }
                Readiness::Empty | Readiness::Yielding => deadline,
                Readiness::CoolingUntil(ready_at) => {
                    if deadline.is_some_and(|d| ready_at > d) {
                        Self::count_miss(&mut state, wait);
                        return Ok(false);
                    }
                    Some(ready_at)
                }
            };

            if wake_at.is_some_and(|t| t <= now) {
                Self::count_miss(&mut state, wait);
                return Ok(false);
            }

            let wake_at = match token {
                Some(_) => {
                    let poll = now + CANCEL_POLL_INTERVAL;
                    Some(wake_at.map_or(poll, |t| t.min(poll)))
                }
                None => wake_at,
            };

            drop(state);

            let parked = Instant::now();
            self.wakeup.wait(seen, wake_at);
            if matches!(readiness, Readiness::CoolingUntil(_)) {
                waits.cooldown += parked.elapsed();
            }
        }
    }

    /// Take the lock the way `wait` allows.  `Ok(None)` means the deadline
    /// passed first.
    fn lock_for_consumer(
        &self,
        wait: Wait<'_>,
    ) -> Result<Option<MutexGuard<'_, State<W>>>, SchedulerError> {
        match wait {
            Wait::Poll(_) | Wait::Forever => Ok(Some(self.state.lock())),
            Wait::Until(deadline) => Ok(self.state.try_lock_until(deadline)),
            Wait::Cancellable(token) => self.lock_cancellable(token).map(Some),
        }
    }

    fn count_miss(state: &mut State<W>, wait: Wait<'_>) {
        match wait {
            Wait::Poll(_) => state.stats.scheduled.not_ready_calls += 1,
            _ => state.stats.scheduled.timed_out_calls += 1,
        }
    }

    /// Take the coordination lock, giving up if `token` fires first.
    fn lock_cancellable(
        &self,
        token: &CancellationToken,
    ) -> Result<MutexGuard<'_, State<W>>, SchedulerError> {
        loop {
            if token.is_cancelled() {
                return Err(self.cancelled());
            }
            if let Some(state) = self.state.try_lock_for(CANCEL_POLL_INTERVAL) {
                return Ok(state);
            }
        }
    }

    fn cancelled(&self) -> SchedulerError {
        self.cancelled_sends.fetch_add(1, Ordering::Relaxed);
        debug!("Scheduler::send_next: cancelled");
        SchedulerError::Cancelled
    }

    // ── Consumers: async ──────────────────────────────────────────────────────

    /// Async counterpart of [`send_next_cancellable`](Self::send_next_cancellable).
    ///
    /// Suspends on the queue, on the cooldown and on a busy coordination lock
    /// (e.g. an exclusive borrow) without occupying a worker thread.  The
    /// write itself is synchronous and happens under the lock.
    ///
    /// # Errors
    /// [`SchedulerError::Cancelled`] if `token` fires before a message is
    /// dequeued; [`SchedulerError::Io`] if the write fails.
    pub async fn send_next_async(&self, token: &CancellationToken) -> Result<(), SchedulerError> {
        let mut waits = Waits::default();

        loop {
            // Register interest before looking at the queue so an enqueue
            // between the check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if token.is_cancelled() {
                return Err(self.cancelled());
            }

            match self.try_transmit_next(waits)? {
                Some(Readiness::Ready) => return Ok(()),
                Some(Readiness::Empty | Readiness::Yielding) => {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = notified.as_mut() => {}
                    }
                }
                None => {
                    let parked = Instant::now();
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => {}
                    }
                    waits.lock += parked.elapsed();
                }
                Some(Readiness::CoolingUntil(ready_at)) => {
                    let parked = Instant::now();
                    tokio::select! {
                        _ = token.cancelled() => {}
                        // Cooldown changed: re-read it.
                        _ = notified.as_mut() => {}
                        _ = tokio::time::sleep_until(ready_at.into()) => {}
                    }
                    waits.cooldown += parked.elapsed();
                }
            }
        }
    }

    /// Transmit if the lock is free and a message is ready.  `None` means the
    /// lock is held elsewhere; `Ready` means a message was sent.
    fn try_transmit_next(&self, waits: Waits) -> Result<Option<Readiness>, SchedulerError> {
        let Some(mut state) = self.state.try_lock() else {
            return Ok(None);
        };

        let readiness = self.readiness(&state, Instant::now());
        if readiness == Readiness::Ready {
            self.transmit_next(&mut state, waits)?;
        }
        Ok(Some(readiness))
    }

    // ── Exclusive access ──────────────────────────────────────────────────────

    /// Take sole ownership of the channel.
    ///
    /// Blocks until the coordination lock is free and the cooldown has
    /// elapsed.  Every other scheduler operation waits until the returned
    /// guard is dropped; release happens on every exit path, unwinding
    /// included.
    pub fn acquire_channel_exclusive(&self) -> ChannelGuard<'_, W> {
        let Some((state, waits)) = self.lock_for_bypass(None) else {
            unreachable!("untimed bypass acquisition cannot time out");
        };
        self.exclusive(state, waits)
    }

    /// Like [`acquire_channel_exclusive`](Self::acquire_channel_exclusive),
    /// but gives up if the lock and the cooldown are not both clear within
    /// `timeout`.
    pub fn try_acquire_channel_exclusive(&self, timeout: Duration) -> Option<ChannelGuard<'_, W>> {
        // An unrepresentable deadline means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        match self.lock_for_bypass(deadline) {
            Some((state, waits)) => Some(self.exclusive(state, waits)),
            None => {
                self.exclusive_timeouts.fetch_add(1, Ordering::Relaxed);
                debug!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Scheduler::try_acquire_channel_exclusive: timed out"
                );
                None
            }
        }
    }

    /// Run `f` with exclusive access to the channel and return its result.
    pub fn with_channel_exclusive<R>(&self, f: impl FnOnce(&mut ChannelGuard<'_, W>) -> R) -> R {
        let mut guard = self.acquire_channel_exclusive();
        f(&mut guard)
    }

    fn exclusive<'a>(
        &'a self,
        mut state: MutexGuard<'a, State<W>>,
        waits: Waits,
    ) -> ChannelGuard<'a, W> {
        state.capacity.mark_in_use();
        debug!(
            lock_wait_ms = waits.lock.as_millis() as u64,
            cooldown_wait_ms = waits.cooldown.as_millis() as u64,
            "Scheduler: exclusive channel access granted"
        );
        ChannelGuard::new(state, waits)
    }

    // ── Statistics ────────────────────────────────────────────────────────────

    /// Snapshot of the write statistics.
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.state.lock().stats.clone();
        stats.exclusive.timed_out_calls += self.exclusive_timeouts.load(Ordering::Relaxed);
        stats.scheduled.timed_out_calls += self.lock_timeouts.load(Ordering::Relaxed);
        stats.scheduled.cancelled_calls += self.cancelled_sends.load(Ordering::Relaxed);
        stats
    }

    /// Channel busy/idle split since the last [`reset_usage`](Self::reset_usage).
    pub fn usage(&self) -> UsageSample {
        self.state.lock().capacity.sample()
    }

    /// Return the current usage sample and start a new window.
    pub fn reset_usage(&self) -> UsageSample {
        self.state.lock().capacity.reset()
    }

    // ── Core ──────────────────────────────────────────────────────────────────

    /// Wake every parked waiter, blocking and async.
    fn wake_all(&self) {
        self.wakeup.bump();
        self.notify.notify_waiters();
    }

    /// Earliest instant the next write may start, or `None` if it may start
    /// now (no write has happened yet).
    fn ready_at(&self, state: &State<W>) -> Option<Instant> {
        state.last_transmit.map(|last| last + self.cooldown())
    }

    fn readiness(&self, state: &State<W>, now: Instant) -> Readiness {
        if state.queues.is_empty() {
            return Readiness::Empty;
        }
        if self.bypass_waiters.load(Ordering::Acquire) > 0 {
            return Readiness::Yielding;
        }
        match self.ready_at(state) {
            Some(ready_at) if ready_at > now => Readiness::CoolingUntil(ready_at),
            _ => Readiness::Ready,
        }
    }

    /// Lock the channel for an immediate send or an exclusive borrow once the
    /// cooldown has elapsed.  Queued messages yield for as long as this runs.
    ///
    /// `None` only if `deadline` passed first.
    fn lock_for_bypass(
        &self,
        deadline: Option<Instant>,
    ) -> Option<(MutexGuard<'_, State<W>>, Waits)> {
        self.bypass_waiters.fetch_add(1, Ordering::AcqRel);
        let acquired = self.lock_when_cooled(deadline);
        self.bypass_waiters.fetch_sub(1, Ordering::AcqRel);
        // Yielding consumers re-check; those that find the lock taken wait
        // behind it.
        self.wake_all();
        acquired
    }

    fn lock_when_cooled(
        &self,
        deadline: Option<Instant>,
    ) -> Option<(MutexGuard<'_, State<W>>, Waits)> {
        let mut waits = Waits {
            timed: deadline.is_some(),
            ..Waits::default()
        };

        loop {
            let started = Instant::now();
            let state = match deadline {
                Some(deadline) => self.state.try_lock_until(deadline)?,
                None => self.state.lock(),
            };
            waits.lock += started.elapsed();

            let seen = self.wakeup.current();
            let ready_at = match self.ready_at(&state) {
                Some(ready_at) if ready_at > Instant::now() => ready_at,
                _ => return Some((state, waits)),
            };
            if deadline.is_some_and(|d| ready_at > d) {
                return None;
            }

            drop(state);

            let parked = Instant::now();
            self.wakeup.wait(seen, Some(ready_at));
            waits.cooldown += parked.elapsed();
        }
    }

    /// Dequeue the next message and write it.
    ///
    /// # Panics
    /// If nothing is queued.  Callers check [`readiness`](Self::readiness)
    /// under the same lock first.
    fn transmit_next(&self, state: &mut State<W>, waits: Waits) -> Result<(), SchedulerError> {
        let Some((priority, message)) = state.queues.pop_next() else {
            unreachable!("transmit_next called without a queued message");
        };
        self.pending.store(state.queues.len(), Ordering::Release);

        debug!(
            priority,
            len = message.len(),
            pending = state.queues.len(),
            "Scheduler::send_next: dequeued"
        );
        self.transmit(state, message.as_bytes(), SendPath::Scheduled, waits)
    }

    /// Write `bytes`, refresh the cooldown clock and record statistics.
    ///
    /// The clock is refreshed even when the write fails: part of the payload
    /// may already be on the wire.
    fn transmit(
        &self,
        state: &mut State<W>,
        bytes: &[u8],
        path: SendPath,
        waits: Waits,
    ) -> Result<(), SchedulerError> {
        state.capacity.mark_in_use();
        let started = Instant::now();
        let result = state
            .channel
            .write_all(bytes)
            .and_then(|()| state.channel.flush());
        let finished = Instant::now();
        state.last_transmit = Some(finished);
        state.capacity.mark_idle();

        let stats = state.stats.path_mut(path);
        stats.record_waits(waits);
        stats.record_write(bytes.len(), finished - started, result.is_ok());

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(?path, len = bytes.len(), error = %e, "channel write failed");
                Err(e.into())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
