/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mcm_sched::channel::{self, BoxedChannel};
use mcm_sched::script::{self, ScriptEntry};
use mcm_sched::{AppConfig, Scheduler, SendPath};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Replays a message script through the outbound scheduler.
///
/// Example:
///   mcm-sched --script packets.yaml --port /dev/ttyACM0 --cooldown-ms 20
#[derive(Debug, Parser)]
#[command(
    name = "mcm-sched",
    about = "MCM outbound message scheduler – script replay",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scheduler/channel configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to the YAML message script to replay.
    #[arg(short = 's', long = "script")]
    script: PathBuf,

    /// Serial port to write to (overrides the configuration file).
    #[arg(short = 'p', long = "port")]
    port: Option<String>,

    /// Cooldown between writes in milliseconds (overrides the configuration file).
    #[arg(long = "cooldown-ms")]
    cooldown_ms: Option<u64>,

    /// Number of concurrent consumer tasks (overrides the configuration file).
    #[arg(short = 'n', long = "consumers")]
    consumers: Option<usize>,
}

type SharedScheduler = Arc<Scheduler<BoxedChannel>>;

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("mcm-sched starting up...");

    let cli = Cli::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => match AppConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, using default settings");
            AppConfig::default()
        }
    };

    if let Some(port) = cli.port {
        config.channel.port = Some(port);
    }
    if let Some(cooldown_ms) = cli.cooldown_ms {
        config.scheduler.cooldown_ms = cooldown_ms;
    }
    if let Some(consumers) = cli.consumers {
        config.consumers = consumers;
    }
    if let Err(e) = config.validate() {
        error!("Invalid settings: {:#}", e);
        process::exit(1);
    }

    info!(
        cooldown_ms = config.scheduler.cooldown_ms,
        port        = ?config.channel.port,
        baud_rate   = config.channel.baud_rate,
        consumers   = config.consumers,
        "Configuration"
    );

    // ── Script & channel ──────────────────────────────────────────────────────
    let entries = match script::load_from_file(&cli.script) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to load message script: {:#}", e);
            process::exit(1);
        }
    };

    let channel = match channel::open(&config.channel) {
        Ok(channel) => channel,
        Err(e) => {
            error!("Failed to open channel: {:#}", e);
            process::exit(1);
        }
    };

    let scheduler: SharedScheduler = Arc::new(Scheduler::from_config(channel, &config.scheduler));

    // ── Consumers ─────────────────────────────────────────────────────────────
    let token = CancellationToken::new();
    let consumers: Vec<_> = (0..config.consumers)
        .map(|id| tokio::spawn(run_consumer(id, Arc::clone(&scheduler), token.clone())))
        .collect();

    // ── Replay ────────────────────────────────────────────────────────────────
    tokio::select! {
        _ = replay(&scheduler, entries) => {
            wait_for_drain(&scheduler).await;
        }
        _ = tokio::signal::ctrl_c() => {
            let dropped = scheduler.drop_all_pending();
            warn!(dropped, "Interrupted, pending messages discarded");
        }
    }

    token.cancel();
    let mut sent = 0;
    for handle in consumers {
        match handle.await {
            Ok(n) => sent += n,
            Err(e) => error!("Consumer task failed: {}", e),
        }
    }

    report(&scheduler, sent);
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

/// Drain the queue until cancelled.  Returns the number of messages sent.
async fn run_consumer(id: usize, scheduler: SharedScheduler, token: CancellationToken) -> u64 {
    debug!(consumer = id, "Consumer started");
    let mut sent = 0;
    loop {
        match scheduler.send_next_async(&token).await {
            Ok(()) => sent += 1,
            Err(e) if e.is_cancelled() => break,
            // Not retried: the message is gone, the next one is still valid.
            Err(e) => warn!(consumer = id, "Scheduled write failed: {}", e),
        }
    }
    debug!(consumer = id, sent, "Consumer stopped");
    sent
}

/// Submit every script entry.  Immediate entries block on the cooldown, so
/// they run on the blocking pool.
async fn replay(scheduler: &SharedScheduler, entries: Vec<ScriptEntry>) {
    for (index, entry) in entries.into_iter().enumerate() {
        let name = entry.display_name(index);

        let result = if entry.is_immediate() {
            let scheduler = Arc::clone(scheduler);
            match tokio::task::spawn_blocking(move || {
                scheduler.send(&entry.bytes, entry.priority)
            })
            .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!(entry = %name, "Immediate send task failed: {}", e);
                    continue;
                }
            }
        } else {
            scheduler.send(&entry.bytes, entry.priority)
        };

        match result {
            Ok(()) => debug!(entry = %name, "Submitted"),
            Err(e) => warn!(entry = %name, "Submission failed: {}", e),
        }
    }
    info!(pending = scheduler.pending_count(), "Script submitted");
}

async fn wait_for_drain(scheduler: &SharedScheduler) {
    let poll = scheduler.cooldown().max(Duration::from_millis(1));
    while scheduler.has_pending() {
        tokio::time::sleep(poll).await;
    }
}

fn report(scheduler: &SharedScheduler, sent: u64) {
    let stats = scheduler.stats();
    let usage = scheduler.usage();

    info!(
        sent,
        enqueued    = stats.total_enqueued,
        dropped     = stats.total_dropped,
        peak_pending = stats.peak_pending,
        "Replay finished"
    );
    for path in [SendPath::Immediate, SendPath::Scheduled] {
        let s = stats.path(path);
        info!(
            ?path,
            ok          = s.successful_writes,
            failed      = s.failed_writes,
            bytes       = s.bytes_transferred,
            cooldown_ms = s.time_blocked_on_cooldown.as_millis() as u64,
            "Write statistics"
        );
    }
    info!(
        busy_ms     = usage.time_in_use.as_millis() as u64,
        idle_ms     = usage.time_idle.as_millis() as u64,
        utilisation = %format!("{:.1}%", usage.utilisation() * 100.0),
        "Channel usage"
    );

    match serde_yaml::to_string(&stats) {
        Ok(dump) => debug!("Full statistics:\n{}", dump),
        Err(e) => warn!("Cannot serialise statistics: {}", e),
    }
}
