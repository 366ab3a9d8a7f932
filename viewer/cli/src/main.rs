//! Session Viewer - Command-line Viewer for Live Broadcast Sessions
//!
//! Finds the active broadcast session, attaches to it and reports what
//! arrives: phase changes, analysis results and frame counters.
//!
//! # Usage
//!
//! ```bash
//! # Is anything live?
//! session-viewer status
//!
//! # Attach to the current session and report activity
//! session-viewer watch
//!
//! # Wait for a broadcaster, keep watching across sessions
//! session-viewer watch --wait --follow
//!
//! # Different relay
//! session-viewer --api-url http://192.168.1.20:8000 watch
//!
//! # Verbose logging
//! RUST_LOG=debug session-viewer watch
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): deliberate disconnect, then exit

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use viewer_core::{
    default_config_path, load_config_from_path, ConfigOverrides, SessionDiscovery, SessionStatus,
    ViewerConfig, ViewerPhase, ViewerSessionController, ViewerState,
};

/// Session Viewer - attach to a live broadcast session
#[derive(Parser, Debug)]
#[command(name = "session-viewer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "VIEWER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base address of the HTTP API
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Base address for attach URLs (derived from --api-url when absent)
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout: Option<u64>,

    /// Reconnection attempts after an abnormal close
    #[arg(long, value_name = "N")]
    reconnect_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "VIEWER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the session status as JSON
    Status {
        /// Poll until a session is active
        #[arg(long)]
        wait: bool,
    },

    /// Attach to the active session and report activity
    Watch {
        /// Poll until a session is active before attaching
        #[arg(long)]
        wait: bool,

        /// After the broadcaster ends a session, wait for the next one
        #[arg(long)]
        follow: bool,

        /// Print a frame counter every N frames (0 = never)
        #[arg(long, value_name = "N", default_value_t = 30)]
        frame_report: u64,
    },
}

/// How one attached session ended
#[derive(Debug)]
enum Outcome {
    /// Ctrl-C
    Interrupted,
    /// Broadcaster sent `session_completed`
    Ended,
    /// Reconnection gave up
    Exhausted(String),
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("viewer_cli={level},viewer_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Load configuration: file, then environment, then CLI flags
fn load_viewer_config(args: &Args) -> Result<ViewerConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.api_url {
        overrides = overrides.with_api_base_url(url.clone());
    }
    if let Some(ref url) = args.ws_url {
        overrides = overrides.with_ws_base_url(url.clone());
    }
    if let Some(ms) = args.connect_timeout {
        overrides = overrides.with_connect_timeout_ms(ms);
    }
    if let Some(attempts) = args.reconnect_attempts {
        overrides = overrides.with_reconnect_attempts(attempts);
    }
    overrides.apply(&mut config);

    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        status_url = %config.discovery.status_url(),
        ws_base_url = %config.discovery.ws_base_url(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Poll discovery until a session is attachable
///
/// Returns `None` if interrupted first.
async fn wait_until_active<D: SessionDiscovery>(
    controller: &ViewerSessionController<D>,
    poll_interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<SessionStatus> {
    let mut ticker = tokio::time::interval(poll_interval);
    info!(
        interval_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX),
        "Waiting for an active session"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => return None,
            _ = ticker.tick() => {
                match controller.check_session().await {
                    Ok(status) if status.attach_target().is_some() => return Some(status),
                    Ok(_) => debug!("No active session yet"),
                    Err(e) => warn!(error = %e, "Session lookup failed"),
                }
            }
        }
    }
}

/// Print what changed between two snapshots
fn report_changes(previous: &ViewerState, current: &ViewerState, frame_report: u64) {
    if current.phase != previous.phase {
        match (&current.phase, &current.session_id) {
            (ViewerPhase::Attached, Some(id)) => println!("[attached] session {id}"),
            (phase, _) => println!("[{phase}]"),
        }
    }
    if current.link_up != previous.link_up && current.phase == ViewerPhase::Attached {
        println!("[link {}]", if current.link_up { "up" } else { "down" });
    }
    if current.last_error != previous.last_error {
        if let Some(ref message) = current.last_error {
            println!("[error] {message}");
        }
    }
    if current.latest_analysis != previous.latest_analysis {
        if let Some(ref analysis) = current.latest_analysis {
            println!("analysis {analysis}");
        }
    }
    if let (Some(now), Some(before)) = (
        current.frames_received.checked_div(frame_report),
        previous.frames_received.checked_div(frame_report),
    ) {
        if now > before {
            println!("frames {}", current.frames_received);
        }
    }
}

/// Report an attached session until it ends
async fn follow_session<D: SessionDiscovery>(
    controller: &ViewerSessionController<D>,
    max_attempts: u32,
    frame_report: u64,
    shutdown: &mut watch::Receiver<bool>,
) -> Outcome {
    let mut state = controller.watch();
    let initial = state.borrow_and_update().clone();
    report_changes(&ViewerState::default(), &initial, frame_report);
    let mut last = initial;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return Outcome::Interrupted,
            changed = state.changed() => {
                if changed.is_err() {
                    return Outcome::Ended;
                }
                let current = state.borrow_and_update().clone();
                report_changes(&last, &current, frame_report);

                if current.ended_by_broadcaster {
                    println!("[session ended by broadcaster]");
                    return Outcome::Ended;
                }
                let gave_up = current.phase == ViewerPhase::Errored
                    && !current.link_up
                    && controller
                        .client()
                        .is_some_and(|c| !c.is_connected() && c.reconnect_attempts() >= max_attempts);
                if gave_up {
                    return Outcome::Exhausted(current.last_error.unwrap_or_default());
                }
                last = current;
            }
        }
    }
}

async fn run_status(
    config: &ViewerConfig,
    wait: bool,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let controller = ViewerSessionController::from_config(config)?;

    let status = if wait {
        match wait_until_active(&controller, config.discovery.poll_interval(), &mut shutdown).await {
            Some(status) => status,
            None => return Ok(()),
        }
    } else {
        controller
            .check_session()
            .await
            .context("Session lookup failed")?
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_watch(
    config: &ViewerConfig,
    wait: bool,
    follow: bool,
    frame_report: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut controller = ViewerSessionController::from_config(config)?;
    let mut waiting = wait;

    loop {
        if waiting
            && wait_until_active(&controller, config.discovery.poll_interval(), &mut shutdown)
                .await
                .is_none()
        {
            return Ok(());
        }

        controller
            .connect()
            .await
            .context("Failed to attach to session")?;

        match follow_session(
            &controller,
            config.transport.reconnect_attempts,
            frame_report,
            &mut shutdown,
        )
        .await
        {
            Outcome::Interrupted => {
                controller.disconnect();
                println!("[disconnected]");
                return Ok(());
            }
            Outcome::Ended if follow => waiting = true,
            Outcome::Ended => return Ok(()),
            Outcome::Exhausted(message) => anyhow::bail!("Lost the session: {message}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);

    info!("Session viewer starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_viewer_config(&args)?;

    let (shutdown_tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    match args.command {
        Command::Status { wait } => run_status(&config, wait, shutdown).await,
        Command::Watch {
            wait,
            follow,
            frame_report,
        } => run_watch(&config, wait, follow, frame_report, shutdown).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_watch() {
        let args = Args::try_parse_from([
            "session-viewer",
            "--api-url",
            "http://relay:8000",
            "watch",
            "--follow",
            "--frame-report",
            "10",
        ])
        .unwrap();

        assert_eq!(args.api_url.as_deref(), Some("http://relay:8000"));
        match args.command {
            Command::Watch {
                wait,
                follow,
                frame_report,
            } => {
                assert!(!wait);
                assert!(follow);
                assert_eq!(frame_report, 10);
            }
            Command::Status { .. } => panic!("expected watch"),
        }
    }

    #[test]
    fn test_args_require_subcommand() {
        assert!(Args::try_parse_from(["session-viewer"]).is_err());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let args = Args::try_parse_from([
            "session-viewer",
            "--config",
            "/nonexistent/viewer.toml",
            "--ws-url",
            "ws://relay:9000",
            "--reconnect-attempts",
            "2",
            "status",
        ])
        .unwrap();

        let config = load_viewer_config(&args).unwrap();
        assert_eq!(config.discovery.ws_base_url(), "ws://relay:9000");
        assert_eq!(config.transport.reconnect_attempts, 2);
    }
}
