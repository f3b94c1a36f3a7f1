/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! mcm-sched – outbound message scheduler for the MCM controller link
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── message       – Message payloads and priority constants
//! ├── scheduler/    – Scheduler, priority queues, exclusive guard, errors
//! ├── stats/        – per-path write statistics and channel capacity monitor
//! ├── config/       – YAML configuration (cooldown, serial port, consumers)
//! ├── channel/      – channel backends (serial port, hex-dump sink)
//! └── script        – YAML message scripts replayed by the binary
//! ```

pub mod channel;
pub mod config;
pub mod message;
pub mod scheduler;
pub mod script;
pub mod stats;

pub use config::{AppConfig, ChannelConfig, SchedulerConfig};
pub use message::{Message, Priority, DEFAULT_PRIORITY, IMMEDIATE_PRIORITY};
pub use scheduler::{ArgumentReason, ChannelGuard, Scheduler, SchedulerError};
pub use stats::{SchedulerStats, SendPath, UsageSample, WriteStats};
