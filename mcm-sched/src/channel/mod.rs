/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Channel backends for the scheduler.
//!
//! The scheduler only needs `Write + Send`.  This module provides the two
//! channels the binary drives:
//!
//! | Backend | When |
//! |---|---|
//! | serial port (`serialport`, 8N1, no flow control) | `channel.port` set, `serial` feature enabled |
//! | [`HexDumpChannel`] on stdout | no port configured |

use std::io::{self, Write};

use anyhow::Result;
use tracing::info;

use crate::config::ChannelConfig;

/// Boxed channel handed to the scheduler by the binary.
pub type BoxedChannel = Box<dyn Write + Send>;

/// Open the channel described by `config`.
///
/// # Errors
/// Returns an error if the serial port cannot be opened, or if a port is
/// configured but the crate was built without the `serial` feature.
pub fn open(config: &ChannelConfig) -> Result<BoxedChannel> {
    match &config.port {
        Some(port) => open_serial(config, port),
        None => {
            info!("No serial port configured, dumping packets to stdout");
            Ok(Box::new(HexDumpChannel::new(io::stdout())))
        }
    }
}

#[cfg(feature = "serial")]
fn open_serial(config: &ChannelConfig, port_name: &str) -> Result<BoxedChannel> {
    use anyhow::Context;

    info!(
        port = port_name,
        baud_rate = config.baud_rate,
        "Opening serial channel"
    );

    let port = serialport::new(port_name, config.baud_rate)
        .timeout(config.timeout())
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .open()
        .with_context(|| format!("Failed to open serial port {}", port_name))?;

    // Drop anything the controller sent before we attached.
    port.clear(serialport::ClearBuffer::All)
        .with_context(|| format!("Failed to clear buffers of {}", port_name))?;

    Ok(Box::new(port))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_config: &ChannelConfig, port_name: &str) -> Result<BoxedChannel> {
    anyhow::bail!(
        "serial port {} requested but mcm-sched was built without the `serial` feature",
        port_name
    )
}

// ── Hex dump sink ─────────────────────────────────────────────────────────────

/// Channel that renders every write as one numbered line of hex bytes.
///
/// ```text
/// 0000  11 04 01 00
/// 0001  7f
/// ```
#[derive(Debug)]
pub struct HexDumpChannel<W> {
    inner: W,
    packets: u64,
}

impl<W: Write> HexDumpChannel<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, packets: 0 }
    }

    /// Number of writes rendered so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for HexDumpChannel<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut line = format!("{:04} ", self.packets);
        for byte in buf {
            line.push_str(&format!(" {:02x}", byte));
        }
        writeln!(self.inner, "{}", line)?;
        self.packets += 1;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
