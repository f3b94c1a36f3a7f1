/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Outbound message and priority types.
//!
//! A [`Message`] is one transmission unit: an opaque byte payload that the
//! scheduler writes to the channel in a single `write_all`.  It is immutable
//! once queued.
//!
//! # Ownership model
//! ```text
//! producer ──enqueue(&[u8])──────────►  Message::copied  (private copy)
//! producer ──enqueue_shared(Arc<[u8]>)►  Message::shared  (view into caller buffer)
//! ```
//! The shared variant is the zero-copy path.  The caller keeps its `Arc`, but
//! `Arc<[u8]>` hands out no `&mut`, so the bytes cannot change while the
//! message waits in the queue.

use std::ops::Range;
use std::sync::Arc;

use crate::scheduler::ArgumentReason;

// ── Priority ──────────────────────────────────────────────────────────────────

/// Priority key of a queued message.  Higher values are serviced first.
pub type Priority = i32;

/// The reserved priority level.  Always present in the queue map.
pub const DEFAULT_PRIORITY: Priority = 0;

/// Sentinel that routes [`Scheduler::send`](crate::Scheduler::send) through
/// the bypass path instead of the queue.
pub const IMMEDIATE_PRIORITY: Priority = Priority::MAX;

// ── Message ───────────────────────────────────────────────────────────────────

/// One queued transmission unit.
///
/// Only built through [`copied`](Self::copied) or [`shared`](Self::shared),
/// so a `Message` is never empty and a shared range always fits its buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    /// Private copy taken at enqueue time.
    Owned(Box<[u8]>),

    /// Zero-copy view `buf[range]` of a caller-owned buffer.
    Shared { buf: Arc<[u8]>, range: Range<usize> },
}

impl Message {
    /// Copy `payload` into a new owned message.
    ///
    /// # Errors
    /// [`ArgumentReason::EmptyPayload`] if `payload` is empty.
    pub fn copied(payload: &[u8]) -> Result<Self, ArgumentReason> {
        if payload.is_empty() {
            return Err(ArgumentReason::EmptyPayload);
        }
        Ok(Message {
            payload: Payload::Owned(payload.into()),
        })
    }

    /// Wrap `buf[range]` without copying.
    ///
    /// # Errors
    /// * [`ArgumentReason::RangeOutOfBounds`] if the range does not fit in
    ///   `buf` (or is inverted).
    /// * [`ArgumentReason::EmptyPayload`] if the range is empty.
    pub fn shared(buf: Arc<[u8]>, range: Range<usize>) -> Result<Self, ArgumentReason> {
        if range.start > range.end || range.end > buf.len() {
            return Err(ArgumentReason::RangeOutOfBounds {
                offset: range.start,
                length: range.end.saturating_sub(range.start),
                available: buf.len(),
            });
        }
        if range.is_empty() {
            return Err(ArgumentReason::EmptyPayload);
        }
        Ok(Message {
            payload: Payload::Shared { buf, range },
        })
    }

    /// The bytes that go on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Owned(bytes) => bytes,
            Payload::Shared { buf, range } => &buf[range.clone()],
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// `true` for the zero-copy variant.
    pub fn is_shared(&self) -> bool {
        matches!(self.payload, Payload::Shared { .. })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copied_message_is_independent_of_source() {
        let mut source = vec![0x11u8, 0x04, 0x01, 0x00];
        let msg = Message::copied(&source).unwrap();
        source[0] = 0xFF;
        assert_eq!(msg.as_bytes(), &[0x11, 0x04, 0x01, 0x00]);
        assert!(!msg.is_shared());
    }

    #[test]
    fn copied_rejects_empty_payload() {
        assert_eq!(Message::copied(&[]), Err(ArgumentReason::EmptyPayload));
    }

    #[test]
    fn shared_message_views_the_requested_range() {
        let buf: Arc<[u8]> = Arc::from(&[1u8, 2, 3, 4, 5][..]);
        let msg = Message::shared(Arc::clone(&buf), 1..4).unwrap();
        assert_eq!(msg.as_bytes(), &[2, 3, 4]);
        assert_eq!(msg.len(), 3);
        assert!(msg.is_shared());
        // No copy: the message keeps the caller's allocation alive.
        assert_eq!(Arc::strong_count(&buf), 2);
    }

    #[test]
    fn shared_rejects_range_past_end() {
        let buf: Arc<[u8]> = Arc::from(&[1u8, 2, 3][..]);
        let err = Message::shared(buf, 2..5).unwrap_err();
        assert_eq!(
            err,
            ArgumentReason::RangeOutOfBounds {
                offset: 2,
                length: 3,
                available: 3
            }
        );
    }

    #[test]
    fn shared_rejects_empty_range() {
        let buf: Arc<[u8]> = Arc::from(&[1u8, 2, 3][..]);
        assert_eq!(
            Message::shared(buf, 1..1),
            Err(ArgumentReason::EmptyPayload)
        );
    }

    #[test]
    fn immediate_sentinel_is_the_maximum_priority() {
        assert_eq!(IMMEDIATE_PRIORITY, i32::MAX);
        assert!(IMMEDIATE_PRIORITY > DEFAULT_PRIORITY);
    }
}
