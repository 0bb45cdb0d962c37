//! pushdaemon - delivery orchestration for rate-limited webhooks
//!
//! CLI entry point for running the scheduler and inspecting its state.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pushdaemon::cli::{Cli, Command, OutputFormat};
use pushdaemon::config::{Config, Secrets};
use pushdaemon::delivery::WebhookClient;
use pushdaemon::scheduler::{Scheduler, is_eligible, next_eligible_at};
use pushdaemon::state::{DeliveryState, StateStore};
use pushdaemon::task::{FeedSource, TaskRegistry};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_file: Option<&Path>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context("Failed to open log file")?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(
        cli.log_level.as_deref(),
        config_log_level.as_deref(),
        cli.log_file.as_deref(),
    )
    .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Once => cmd_once(&config).await,
        Command::Status { format } => cmd_status(&config, format),
        Command::Reset { task } => cmd_reset(&config, task.as_deref()),
        Command::Feeds => cmd_feeds(&config),
    }
}

fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let secrets = Secrets::load(config)?;
    let registry = TaskRegistry::from_config(config, &secrets).context("Failed to register feeds")?;
    let client = WebhookClient::from_config(&config.delivery).context("Failed to build HTTP client")?;
    let store = StateStore::new(config.state_path());
    info!(
        feeds = registry.len(),
        state = %store.path().display(),
        "Scheduler configured"
    );
    Ok(Scheduler::new(config.scheduler.clone(), registry, Arc::new(client), store))
}

async fn cmd_run(config: &Config) -> Result<()> {
    let mut scheduler = build_scheduler(config)?;
    if scheduler.tasks().is_empty() {
        warn!("No feeds registered; the scheduler will idle until stopped");
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    wait_for_shutdown_signal().await?;
    let _ = shutdown_tx.send(()).await;

    info!("Waiting for in-flight delivery to finish");
    scheduler_handle.await.context("Scheduler task failed")?;
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    Ok(())
}

async fn cmd_once(config: &Config) -> Result<()> {
    let mut scheduler = build_scheduler(config)?;
    let report = scheduler.run_iteration(Utc::now()).await;

    println!(
        "{} sent, {} failed, {} oversized, {} collection errors, {} skipped",
        report.succeeded.to_string().green(),
        report.failed.to_string().red(),
        report.oversized,
        report.collection_errors,
        report.skipped
    );
    println!("Next feed due in {}s", report.next_wake.as_secs());
    Ok(())
}

/// One row of `pd status`
struct StatusRow {
    id: String,
    configured: bool,
    enabled: bool,
    eligible: bool,
    state: Option<DeliveryState>,
    next: Option<DateTime<Utc>>,
}

fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let store = StateStore::new(config.state_path());
    let state = store.try_load().context("Failed to read delivery state")?;
    let policy = config.scheduler.backoff_policy();
    let now = Utc::now();

    let mut rows: Vec<StatusRow> = config
        .feeds
        .iter()
        .map(|feed| {
            let poll = Duration::from_secs(feed.poll_interval_secs.unwrap_or(config.scheduler.poll_interval_secs));
            let current = state.get(&feed.id).cloned();
            StatusRow {
                id: feed.id.clone(),
                configured: true,
                enabled: feed.enabled,
                eligible: is_eligible(current.as_ref(), now, poll, &policy),
                next: next_eligible_at(current.as_ref(), poll, &policy),
                state: current,
            }
        })
        .collect();

    // Entries left behind by feeds that were removed from the config
    for (id, entry) in state.iter() {
        if !config.feeds.iter().any(|f| &f.id == id) {
            rows.push(StatusRow {
                id: id.clone(),
                configured: false,
                enabled: false,
                eligible: false,
                state: Some(entry.clone()),
                next: None,
            });
        }
    }

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    serde_json::json!({
                        "id": row.id,
                        "configured": row.configured,
                        "enabled": row.enabled,
                        "last_attempt_time": row.state.as_ref().and_then(|s| s.last_attempt_time),
                        "consecutive_failures": row.state.as_ref().map(|s| s.consecutive_failures).unwrap_or(0),
                        "next_eligible_at": row.next,
                        "eligible": row.eligible,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("State file: {}", store.path().display());
            if rows.is_empty() {
                println!("{}", "No feeds configured".dimmed());
            }
            for row in &rows {
                print_status_row(row, now);
            }
        }
    }

    Ok(())
}

fn print_status_row(row: &StatusRow, now: DateTime<Utc>) {
    let id = row.id.bold();
    if !row.configured {
        println!("  {:20} {}", id, "not in config".dimmed());
        return;
    }
    if !row.enabled {
        println!("  {:20} {}", id, "disabled".dimmed());
        return;
    }

    let failures = row.state.as_ref().map(|s| s.consecutive_failures).unwrap_or(0);
    let health = if failures == 0 {
        "ok".green()
    } else {
        format!("{} consecutive failures", failures).yellow()
    };

    let when = match row.next {
        None => "never attempted, due now".to_string(),
        Some(_) if row.eligible => "due now".to_string(),
        Some(at) => format!(
            "next at {} (in {}s)",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            (at - now).num_seconds()
        ),
    };

    println!("  {:20} {:28} {}", id, health, when);
}

fn cmd_reset(config: &Config, task: Option<&str>) -> Result<()> {
    let store = StateStore::new(config.state_path());
    let removed = store.reset(task).context("Failed to reset delivery state")?;

    match (task, removed) {
        (Some(id), true) => println!("Reset delivery state for {}", id.bold()),
        (Some(id), false) => println!("No delivery state recorded for {}", id),
        (None, true) => println!("Reset delivery state for all feeds"),
        (None, false) => println!("No delivery state to reset"),
    }
    Ok(())
}

fn cmd_feeds(config: &Config) -> Result<()> {
    let secrets = Secrets::load(config)?;

    if config.feeds.is_empty() {
        println!("{}", "No feeds configured".dimmed());
        return Ok(());
    }

    for feed in &config.feeds {
        let kind = match &feed.source {
            FeedSource::Static { .. } => "static".to_string(),
            FeedSource::Command { program, .. } => format!("command ({})", program),
        };
        let poll = feed.poll_interval_secs.unwrap_or(config.scheduler.poll_interval_secs);
        let tier = feed.tier.unwrap_or(config.delivery.tier);
        let webhook = if secrets.webhook_id(&feed.webhook_id_key).is_some() {
            feed.webhook_id_key.green()
        } else {
            format!("{} (missing)", feed.webhook_id_key).red()
        };
        let status = if feed.enabled { "enabled".green() } else { "disabled".dimmed() };

        println!(
            "  {:20} {:9} every {}s, tier {}, webhook {}, {}",
            feed.id.bold(),
            status,
            poll,
            tier,
            webhook,
            kind
        );
    }
    Ok(())
}
