/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Priority → FIFO queue map.
//!
//! Levels are kept in a `BTreeMap` so the dequeue scan walks them in
//! descending key order without a separate sorted index.  The
//! [`DEFAULT_PRIORITY`] level is inserted on construction and never removed,
//! every other level is created on first use and dropped by
//! [`compact`](PriorityQueues::compact) once it is empty.
//!
//! This type does no locking; [`Scheduler`](super::Scheduler) owns it behind
//! the coordination lock and keeps the pending-count mirror in step with
//! [`len`](PriorityQueues::len).

use std::collections::{BTreeMap, VecDeque};

use crate::message::{Message, Priority, DEFAULT_PRIORITY};

#[derive(Debug)]
pub struct PriorityQueues {
    levels: BTreeMap<Priority, VecDeque<Message>>,

    /// Sum of all queue lengths.
    len: usize,
}

impl Default for PriorityQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityQueues {
    pub fn new() -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(DEFAULT_PRIORITY, VecDeque::new());
        Self { levels, len: 0 }
    }

    /// Append `message` to the tail of its level, creating the level if absent.
    pub fn push(&mut self, priority: Priority, message: Message) {
        self.levels.entry(priority).or_default().push_back(message);
        self.len += 1;
    }

    /// Remove the head of the highest non-empty level.
    ///
    /// Strict priority across levels, FIFO within a level.  Returns `None`
    /// only when nothing is queued.
    pub fn pop_next(&mut self) -> Option<(Priority, Message)> {
        let (priority, message) = self
            .levels
            .iter_mut()
            .rev()
            .find_map(|(p, queue)| queue.pop_front().map(|m| (*p, m)))?;
        self.len -= 1;
        Some((priority, message))
    }

    /// Total number of queued messages across all levels.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Empty every level.  Returns how many messages were discarded.
    ///
    /// The emptied levels are also compacted away.
    pub fn clear(&mut self) -> usize {
        let dropped = self.len;
        for queue in self.levels.values_mut() {
            queue.clear();
        }
        self.len = 0;
        self.compact();
        dropped
    }

    /// Remove every empty level except [`DEFAULT_PRIORITY`].
    ///
    /// Returns how many levels were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.levels.len();
        self.levels
            .retain(|priority, queue| *priority == DEFAULT_PRIORITY || !queue.is_empty());
        before - self.levels.len()
    }

    /// Priority levels currently in the map, highest first.
    pub fn levels(&self) -> Vec<Priority> {
        self.levels.keys().rev().copied().collect()
    }

    /// Number of messages queued at `priority`.
    pub fn len_at(&self, priority: Priority) -> usize {
        self.levels.get(&priority).map_or(0, VecDeque::len)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(bytes: &[u8]) -> Message {
        Message::copied(bytes).unwrap()
    }

    fn drain(queues: &mut PriorityQueues) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| queues.pop_next())
            .map(|(_, m)| m.as_bytes().to_vec())
            .collect()
    }

    #[test]
    fn new_map_holds_only_the_default_level() {
        let queues = PriorityQueues::new();
        assert_eq!(queues.levels(), vec![DEFAULT_PRIORITY]);
        assert!(queues.is_empty());
    }

    #[test]
    fn higher_priority_drains_first_then_fifo() {
        let mut queues = PriorityQueues::new();
        queues.push(5, msg(b"A"));
        queues.push(5, msg(b"B"));
        queues.push(10, msg(b"C"));

        assert_eq!(drain(&mut queues), vec![b"C".to_vec(), b"A".to_vec(), b"B".to_vec()]);
        assert!(queues.is_empty());
    }

    #[test]
    fn negative_priorities_go_after_default() {
        let mut queues = PriorityQueues::new();
        queues.push(-3, msg(b"low"));
        queues.push(DEFAULT_PRIORITY, msg(b"default"));

        let (p, first) = queues.pop_next().unwrap();
        assert_eq!(p, DEFAULT_PRIORITY);
        assert_eq!(first.as_bytes(), b"default");
        assert_eq!(queues.pop_next().unwrap().0, -3);
    }

    #[test]
    fn pop_on_empty_map_returns_none() {
        let mut queues = PriorityQueues::new();
        assert!(queues.pop_next().is_none());
    }

    #[test]
    fn compact_keeps_default_and_non_empty_levels() {
        let mut queues = PriorityQueues::new();
        queues.push(7, msg(b"x"));
        queues.push(3, msg(b"y"));
        queues.pop_next(); // empties level 7

        assert_eq!(queues.levels(), vec![7, 3, DEFAULT_PRIORITY]);
        assert_eq!(queues.compact(), 1);
        assert_eq!(queues.levels(), vec![3, DEFAULT_PRIORITY]);
        // Idempotent.
        assert_eq!(queues.compact(), 0);
        assert_eq!(queues.len_at(3), 1);
    }

    #[test]
    fn clear_discards_everything_and_compacts() {
        let mut queues = PriorityQueues::new();
        queues.push(1, msg(b"a"));
        queues.push(1, msg(b"b"));
        queues.push(DEFAULT_PRIORITY, msg(b"c"));

        assert_eq!(queues.clear(), 3);
        assert!(queues.is_empty());
        assert_eq!(queues.levels(), vec![DEFAULT_PRIORITY]);
        assert!(queues.pop_next().is_none());
    }

    proptest! {
        #[test]
        fn same_level_delivery_matches_enqueue_order(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..8), 0..64),
            priority in any::<i32>(),
        ) {
            let mut queues = PriorityQueues::new();
            for p in &payloads {
                queues.push(priority, msg(p));
            }
            prop_assert_eq!(drain(&mut queues), payloads);
        }

        #[test]
        fn drained_priorities_never_increase(
            priorities in prop::collection::vec(-5i32..5, 0..64),
        ) {
            let mut queues = PriorityQueues::new();
            for (i, p) in priorities.iter().enumerate() {
                queues.push(*p, msg(&(i as u32).to_be_bytes()));
            }
            prop_assert_eq!(queues.len(), priorities.len());

            let mut last = i32::MAX;
            let mut last_seq_at_level: Option<u32> = None;
            while let Some((p, m)) = queues.pop_next() {
                prop_assert!(p <= last);
                let seq = u32::from_be_bytes(m.as_bytes().try_into().unwrap());
                if p == last {
                    prop_assert!(last_seq_at_level.map_or(true, |prev| prev < seq));
                }
                last = p;
                last_seq_at_level = Some(seq);
            }
        }
    }
}
