/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Message scripts replayed by the `mcm-sched` binary.
//!
//! A script is a YAML list of packets:
//! ```yaml
//! - label: lamp on
//!   priority: 5
//!   bytes: [0x11, 0x04, 0x01, 0x00]
//! - label: emergency stop
//!   priority: immediate
//!   bytes: [0x7F]
//! ```
//! `priority` is an integer level or the keyword `immediate`, and defaults to
//! the default level when omitted.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use tracing::{debug, info};

use crate::message::{Priority, DEFAULT_PRIORITY, IMMEDIATE_PRIORITY};

/// One packet of a script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptEntry {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default = "default_priority", deserialize_with = "deserialize_priority")]
    pub priority: Priority,

    pub bytes: Vec<u8>,
}

impl ScriptEntry {
    pub fn is_immediate(&self) -> bool {
        self.priority == IMMEDIATE_PRIORITY
    }

    /// Label for log output: the explicit label or the entry's position.
    pub fn display_name(&self, index: usize) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("#{}", index),
        }
    }
}

fn default_priority() -> Priority {
    DEFAULT_PRIORITY
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPriority {
    Level(Priority),
    Keyword(String),
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    match RawPriority::deserialize(deserializer)? {
        RawPriority::Level(level) => Ok(level),
        RawPriority::Keyword(word) if word.eq_ignore_ascii_case("immediate") => {
            Ok(IMMEDIATE_PRIORITY)
        }
        RawPriority::Keyword(word) => Err(de::Error::custom(format!(
            "unknown priority `{}` (expected an integer or `immediate`)",
            word
        ))),
    }
}

/// Parse a script from a YAML string.
///
/// # Errors
/// Returns an error if the YAML is malformed or an entry has no bytes.
pub fn parse(content: &str) -> Result<Vec<ScriptEntry>> {
    let entries: Vec<ScriptEntry> =
        serde_yaml::from_str(content).context("Failed to parse message script")?;

    for (index, entry) in entries.iter().enumerate() {
        if entry.bytes.is_empty() {
            bail!("script entry {} has no bytes", entry.display_name(index));
        }
    }
    Ok(entries)
}

/// Load a script file.
///
/// # Errors
/// Returns an error if the file cannot be read or fails [`parse`].
pub fn load_from_file(path: &Path) -> Result<Vec<ScriptEntry>> {
    info!("Loading message script from: {}", path.display());

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open script file: {}", path.display()))?;
    let entries = parse(&content).with_context(|| format!("In {}", path.display()))?;

    debug!(
        entries = entries.len(),
        immediate = entries.iter().filter(|e| e.is_immediate()).count(),
        "Script loaded"
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_levels_keyword_and_default() {
        let yaml = r#"
- label: lamp on
  priority: 5
  bytes: [17, 4, 1, 0]
- priority: immediate
  bytes: [127]
- bytes: [1, 2]
- priority: -3
  bytes: [9]
"#;
        let entries = parse(yaml).unwrap();
        assert_eq!(entries.len(), 4);

        assert_eq!(entries[0].label.as_deref(), Some("lamp on"));
        assert_eq!(entries[0].priority, 5);
        assert_eq!(entries[0].bytes, vec![17, 4, 1, 0]);

        assert!(entries[1].is_immediate());
        assert_eq!(entries[2].priority, DEFAULT_PRIORITY);
        assert_eq!(entries[3].priority, -3);
        assert_eq!(entries[2].display_name(2), "#2");
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        let err = parse("- priority: urgent\n  bytes: [1]\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }

    #[test]
    fn empty_bytes_are_rejected_with_entry_name() {
        let err = parse("- bytes: [1]\n- label: blank\n  bytes: []\n").unwrap_err();
        assert!(err.to_string().contains("blank"));
    }

    #[test]
    fn out_of_range_byte_is_rejected() {
        assert!(parse("- bytes: [256]\n").is_err());
    }

    #[test]
    fn load_from_file_reads_script() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"- priority: 2\n  bytes: [10, 20]\n").unwrap();

        let entries = load_from_file(f.path()).unwrap();
        assert_eq!(entries[0].bytes, vec![10, 20]);
    }

    #[test]
    fn missing_file_returns_error() {
        assert!(load_from_file(Path::new("/nonexistent/script.yaml")).is_err());
    }
}
