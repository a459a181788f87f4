#![forbid(unsafe_code)]

//! `ai-intervention-agent` — feedback middleman server binary.
//!
//! Bootstraps configuration, starts the HTTP surface for the web UI and
//! the stdio MCP transport for the agent, and wires the queue, rendezvous
//! registry, scheduler, and notification dispatcher together.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use ai_intervention_agent::api;
use ai_intervention_agent::api::security::RateLimiter;
use ai_intervention_agent::config::{CliOverrides, ConfigStore};
use ai_intervention_agent::config_watcher::ConfigWatcher;
use ai_intervention_agent::mcp::handler::AppState;
use ai_intervention_agent::mcp::transport;
use ai_intervention_agent::notification::NotificationDispatcher;
use ai_intervention_agent::queue::{TaskQueue, DEFAULT_MAX_TASKS};
use ai_intervention_agent::rendezvous::RendezvousRegistry;
use ai_intervention_agent::scheduler::ResubmitScheduler;
use ai_intervention_agent::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "ai-intervention-agent",
    about = "MCP middleman that pauses an AI agent for human feedback",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the JSONC configuration file.
    ///
    /// Defaults to `config.jsonc` in the working directory, falling back
    /// to the per-user config directory (created on first run).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address for the web UI.
    #[arg(long)]
    host: Option<String>,

    /// Override the web UI port.
    #[arg(long)]
    port: Option<u16>,

    /// Override `feedback.timeout` (seconds one RPC may block overall).
    #[arg(long)]
    timeout: Option<u64>,

    /// Raise the log level to debug.
    #[arg(long)]
    verbose: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format, args.verbose)?;
    info!("ai-intervention-agent server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err(AppError::Config("--timeout must be greater than zero".into()));
        }
    }
    let overrides = CliOverrides {
        host: args.host,
        port: args.port,
        timeout: args.timeout,
    };
    let config = Arc::new(ConfigStore::open(args.config, overrides)?);
    let _watcher = ConfigWatcher::spawn(Arc::clone(&config))?;

    // ── Build shared application state ──────────────────
    let project = std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "task".to_owned());
    let queue = Arc::new(TaskQueue::new(project, DEFAULT_MAX_TASKS));
    queue.clear_all();
    let rendezvous = Arc::new(RendezvousRegistry::new());
    let scheduler = Arc::new(ResubmitScheduler::new(
        Arc::clone(&queue),
        Arc::clone(&rendezvous),
        Arc::clone(&config),
    ));
    let (notifier, notification_runtime) = NotificationDispatcher::start(Arc::clone(&config));

    let state = Arc::new(AppState {
        config,
        queue,
        rendezvous,
        scheduler,
        notifier,
        limiter: RateLimiter::new(),
    });

    // ── Start transports ────────────────────────────────
    let ct = CancellationToken::new();

    let http_handle = {
        let http_state = Arc::clone(&state);
        let http_ct = ct.clone();
        let shutdown_ct = ct.clone();
        tokio::spawn(async move {
            if let Err(err) = api::serve_http(http_state, http_ct).await {
                error!(%err, "http surface failed — initiating shutdown");
                shutdown_ct.cancel();
            }
        })
    };

    let stdio_handle = {
        let stdio_state = Arc::clone(&state);
        let stdio_ct = ct.clone();
        let shutdown_ct = ct.clone();
        tokio::spawn(async move {
            if let Err(err) = transport::serve_stdio(stdio_state, stdio_ct).await {
                error!(%err, "stdio transport failed — initiating shutdown");
                shutdown_ct.cancel();
            }
        })
    };

    info!("feedback server ready");

    // ── Wait for first shutdown signal ──────────────────
    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received — starting graceful shutdown");
        }
        () = ct.cancelled() => {
            info!("transport failure — starting graceful shutdown");
        }
    }
    ct.cancel();

    // Spawn a background listener for a second Ctrl+C (force-exit).
    tokio::spawn(async {
        shutdown_signal().await;
        error!("second shutdown signal received — forcing exit");
        std::process::exit(1);
    });

    shutdown_with_timeout(&state, http_handle, stdio_handle, notification_runtime).await;

    info!("ai-intervention-agent shut down");
    Ok(())
}

/// Maximum time to wait for graceful shutdown before giving up.
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Run the graceful shutdown sequence with a timeout: wake all blocked
/// RPC waiters with a cancellation, disarm all timers, then wait for the
/// transports and the notification worker.
async fn shutdown_with_timeout(
    state: &AppState,
    http_handle: tokio::task::JoinHandle<()>,
    stdio_handle: tokio::task::JoinHandle<()>,
    notification_runtime: ai_intervention_agent::notification::NotificationRuntime,
) {
    let shutdown_fut = async {
        state.rendezvous.cancel_all().await;
        state.scheduler.shutdown().await;

        let _ = http_handle.await;
        let _ = stdio_handle.await;

        notification_runtime.worker_task.abort();
        let _ = notification_runtime.worker_task.await;
    };

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown_fut)
        .await
        .is_err()
    {
        error!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "graceful shutdown timed out — exiting"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, verbose: bool) -> Result<()> {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Stdout carries the MCP stdio framing; logs must go to stderr.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
