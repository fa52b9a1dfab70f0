//! SessionTap Agent - interaction capture host.
//!
//! This binary drives a capture session from the command line: interaction
//! signals arrive as JSON lines on stdin, the observed content is a JSON
//! document on disk, and captured events are delivered to the collector.
//!
//! # Commands
//!
//! - `sessiontap-agent run --document <path>`: Start a capture session
//! - `sessiontap-agent check`: Validate and print the configuration
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use sessiontap_agent::config::Config;
use sessiontap_agent::content::{load_document, StaticContent};
use sessiontap_agent::session::CaptureSession;
use sessiontap_agent::types::Viewport;
use sessiontap_agent::watcher::{DocumentEvent, DocumentWatcher};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// SessionTap Agent - interaction capture host.
///
/// Captures pointer, click, scroll, and structural snapshot events for one
/// session and delivers them in batches to the collector.
#[derive(Parser, Debug)]
#[command(name = "sessiontap-agent")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    SESSIONTAP_SITE_ID               Site identifier (required)
    SESSIONTAP_API_ENDPOINT          Collector base URL (required)
    SESSIONTAP_DEBUG                 Enable debug logging (default: false)
    SESSIONTAP_REQUEST_TIMEOUT_SECS  Delivery request timeout (default: 30)
    SESSIONTAP_MAX_QUEUE_LEN         Cap on buffered events (default: unbounded)

INPUT (one JSON object per line on stdin):
    {\"type\":\"pointerMove\",\"x\":10,\"y\":20}
    {\"type\":\"click\",\"x\":100,\"y\":200,\"target\":\"button\"}
    {\"type\":\"scroll\",\"x\":0,\"y\":480}
    {\"type\":\"contentChanged\"}

EXAMPLES:
    # Validate configuration
    sessiontap-agent check

    # Capture a session against a local collector
    export SESSIONTAP_SITE_ID=site-1
    export SESSIONTAP_API_ENDPOINT=http://localhost:8080
    sessiontap-agent run --document page.json < signals.jsonl
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start a capture session.
    ///
    /// Runs until stdin is closed or a shutdown signal is received, then
    /// flushes remaining events.
    Run {
        /// JSON document describing the observed content tree.
        #[arg(short, long)]
        document: PathBuf,

        /// Location reported in snapshots (default: file URL of the document).
        #[arg(long)]
        url: Option<String>,

        /// Viewport width in pixels.
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Viewport height in pixels.
        #[arg(long, default_value_t = 800)]
        height: u32,
    },

    /// Load configuration from the environment and print it.
    Check,
}

/// One interaction signal read from stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Signal {
    PointerMove { x: i32, y: i32 },
    Click { x: i32, y: i32, target: String },
    Scroll { x: i32, y: i32 },
    ContentChanged,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check => run_check(),
        Command::Run {
            document,
            url,
            width,
            height,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_agent(document, url, Viewport { width, height }))
        }
    }
}

/// Prints the effective configuration.
fn run_check() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    println!("site_id:          {}", config.site_id);
    println!("api_endpoint:     {}", config.api_endpoint);
    println!("debug_logging:    {}", config.debug_logging);
    println!("request_timeout:  {}s", config.request_timeout.as_secs());
    match config.max_queue_len {
        Some(max) => println!("max_queue_len:    {max}"),
        None => println!("max_queue_len:    unbounded"),
    }

    Ok(())
}

/// Runs a capture session until input ends or a shutdown signal arrives.
async fn run_agent(document: PathBuf, url: Option<String>, viewport: Viewport) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(config.debug_logging);

    info!(
        site_id = %config.site_id,
        api_endpoint = %config.api_endpoint,
        "Configuration loaded"
    );

    let root = load_document(&document)
        .with_context(|| format!("Failed to load document {}", document.display()))?;
    let location = match url {
        Some(url) => url,
        None => file_url(&document)?,
    };
    let content = Arc::new(StaticContent::new(root, viewport, location));

    let session = CaptureSession::with_http_delivery(config, content.clone())
        .context("Failed to start capture session")?;

    let (document_tx, mut document_rx) = mpsc::channel::<DocumentEvent>(16);
    let _watcher = DocumentWatcher::new(document.clone(), document_tx).context(format!(
        "Failed to watch document {}",
        document.display()
    ))?;

    info!(session_id = %session.session_id(), "Agent running. Press Ctrl+C to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            Some(event) = document_rx.recv() => {
                handle_document_event(event, &document, &content, &session);
            }

            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_signal_line(&line, &session),
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read input");
                    break;
                }
            }
        }
    }

    info!("Shutting down...");

    let unsent = session
        .shutdown(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS))
        .await;

    if unsent > 0 {
        error!(unsent_events = unsent, "Some events could not be sent");
    }

    info!("Agent stopped");
    Ok(())
}

/// Applies one stdin line to the session.
fn handle_signal_line(line: &str, session: &CaptureSession) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let signal = match serde_json::from_str::<Signal>(line) {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed signal");
            return;
        }
    };

    match signal {
        Signal::PointerMove { x, y } => {
            session.pointer_moved(x, y);
        }
        Signal::Click { x, y, target } => {
            session.clicked(x, y, &target);
        }
        Signal::Scroll { x, y } => {
            session.scrolled(x, y);
        }
        Signal::ContentChanged => session.content_changed(),
    }
}

/// Reloads the document after a change on disk.
fn handle_document_event(
    event: DocumentEvent,
    path: &Path,
    content: &StaticContent,
    session: &CaptureSession,
) {
    match event {
        DocumentEvent::Changed => match load_document(path) {
            Ok(root) => {
                debug!(path = %path.display(), "Document reloaded");
                content.replace(root);
                session.content_changed();
            }
            // Editors may leave a partially written file; the next event retries
            Err(e) => warn!(error = %e, "Failed to reload document"),
        },
        DocumentEvent::Removed => {
            warn!(path = %path.display(), "Document removed");
            content.clear();
        }
    }
}

fn file_url(path: &Path) -> Result<String> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(format!("file://{}", canonical.display()))
}

/// Initializes the logging subsystem.
///
/// `RUST_LOG` takes precedence over the configured debug flag.
fn init_logging(debug_logging: bool) {
    let default_level = if debug_logging { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
