/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the outbound scheduler.
//!
//! Two types model the two failure layers:
//!
//! * [`ArgumentReason`]: why a payload was refused before it touched the
//!   queue (carries the offending offsets/lengths).
//! * [`SchedulerError`]: top-level failure returned from the send and
//!   enqueue operations of [`Scheduler`](super::Scheduler).
//!
//! A timeout is **not** an error: bounded calls report it as `Ok(false)`.
//! Dequeuing from an empty queue is a contract violation and panics instead
//! of surfacing here.

use thiserror::Error;

// ── Argument validation ───────────────────────────────────────────────────────

/// Detailed reason why a payload was rejected.
///
/// Carried inside [`SchedulerError::InvalidArgument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentReason {
    /// The payload (or the selected range of it) has zero bytes.
    EmptyPayload,

    /// A zero-copy range does not fit inside the caller's buffer.
    RangeOutOfBounds {
        offset: usize,
        length: usize,
        available: usize,
    },
}

impl std::fmt::Display for ArgumentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgumentReason::EmptyPayload => write!(f, "payload has 0 bytes to send"),

            ArgumentReason::RangeOutOfBounds {
                offset,
                length,
                available,
            } => write!(
                f,
                "offset {} + length {} exceeds buffer of {} bytes",
                offset, length, available
            ),
        }
    }
}

// ── Top-level scheduler errors ────────────────────────────────────────────────

/// Top-level error type returned by the [`Scheduler`](super::Scheduler).
///
/// | Variant | Raised by | Scheduler state afterwards |
/// |---|---|---|
/// | `InvalidArgument` | `enqueue*`, `send_immediate` | unchanged |
/// | `Io` | any send path | message consumed, cooldown refreshed |
/// | `Cancelled` | `send_next_cancellable`, `send_next_async` | unchanged |
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The caller handed over a payload that cannot be transmitted.
    #[error("invalid argument: {0}")]
    InvalidArgument(ArgumentReason),

    /// The channel write failed.  Not retried; the message is not re-queued.
    #[error("channel write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The wait was cancelled before a message was dequeued.
    #[error("send cancelled before a message was dequeued")]
    Cancelled,
}

impl From<ArgumentReason> for SchedulerError {
    fn from(reason: ArgumentReason) -> Self {
        SchedulerError::InvalidArgument(reason)
    }
}

impl SchedulerError {
    /// `true` for [`SchedulerError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SchedulerError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_reason_messages_carry_values() {
        let reason = ArgumentReason::RangeOutOfBounds {
            offset: 4,
            length: 8,
            available: 10,
        };
        assert_eq!(
            reason.to_string(),
            "offset 4 + length 8 exceeds buffer of 10 bytes"
        );
        assert_eq!(
            SchedulerError::from(ArgumentReason::EmptyPayload).to_string(),
            "invalid argument: payload has 0 bytes to send"
        );
    }

    #[test]
    fn io_errors_convert_and_are_not_cancellation() {
        let err: SchedulerError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged").into();
        assert!(matches!(err, SchedulerError::Io(_)));
        assert!(!err.is_cancelled());
        assert!(SchedulerError::Cancelled.is_cancelled());
    }
}
