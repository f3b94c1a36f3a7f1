/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler and channel configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   cooldown_ms: 15
//! channel:
//!   port: "/dev/ttyACM0"
//!   baud_rate: 115200
//!   timeout_ms: 500
//! consumers: 1
//! ```
//!
//! Every field is optional; missing values fall back to the defaults the
//! controller link runs with (15 ms cooldown, 115200 baud 8N1).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Cooldown the controller firmware needs between two writes.
pub const DEFAULT_COOLDOWN_MS: u64 = 15;

/// Baud rate of the controller's USB CDC link.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Settings for the [`Scheduler`](crate::Scheduler) itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum gap between the end of one write and the start of the next.
    pub cooldown_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

impl SchedulerConfig {
    /// Get the cooldown as a Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

// ── Channel ───────────────────────────────────────────────────────────────────

/// Serial channel settings.  Framing is fixed at 8 data bits, no parity,
/// one stop bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Serial port name.  `None` selects the hex-dump sink on stdout.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Per-write timeout of the serial port.
    pub timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 500,
        }
    }
}

impl ChannelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Application ───────────────────────────────────────────────────────────────

/// Top-level configuration of the `mcm-sched` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub channel: ChannelConfig,
    /// Number of concurrent consumer tasks draining the queue.
    pub consumers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            channel: ChannelConfig::default(),
            consumers: 1,
        }
    }
}

impl AppConfig {
    /// Parses `path` into an [`AppConfig`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid, or if a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        debug!(
            cooldown_ms = config.scheduler.cooldown_ms,
            port = ?config.channel.port,
            baud_rate = config.channel.baud_rate,
            consumers = config.consumers,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.consumers == 0 {
            bail!("consumers must be at least 1");
        }
        if self.channel.baud_rate == 0 {
            bail!("channel.baud_rate must be non-zero");
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_match_controller_link() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.scheduler.cooldown(), Duration::from_millis(15));
        assert_eq!(cfg.channel.baud_rate, 115_200);
        assert_eq!(cfg.channel.port, None);
        assert_eq!(cfg.consumers, 1);
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
scheduler:
  cooldown_ms: 30
channel:
  port: "/dev/ttyACM0"
  baud_rate: 921600
  timeout_ms: 250
consumers: 2
"#;
        let f = yaml_tempfile(yaml);
        let cfg = AppConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.scheduler.cooldown_ms, 30);
        assert_eq!(cfg.channel.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cfg.channel.baud_rate, 921_600);
        assert_eq!(cfg.channel.timeout(), Duration::from_millis(250));
        assert_eq!(cfg.consumers, 2);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let f = yaml_tempfile("scheduler:\n  cooldown_ms: 0\n");
        let cfg = AppConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.scheduler.cooldown(), Duration::ZERO);
        assert_eq!(cfg.channel, ChannelConfig::default());
        assert_eq!(cfg.consumers, 1);
    }

    #[test]
    fn zero_consumers_is_rejected() {
        let f = yaml_tempfile("consumers: 0\n");
        let err = AppConfig::load_from_file(f.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("consumers"));
    }

    #[test]
    fn missing_file_returns_error() {
        let result = AppConfig::load_from_file(Path::new("/nonexistent/path/mcm.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(AppConfig::load_from_file(f.path()).is_err());
    }
}
