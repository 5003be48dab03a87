use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use throttle_guard::config::GuardConfig;
use throttle_guard::throttle::{Guard, PolicyOverrides, Verdict};

/// Throttle caller identities read from stdin, one per line.
#[derive(Debug, Parser)]
#[command(name = "throttle-guard", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requests allowed per streak
    #[arg(long)]
    max_requests: Option<u32>,

    /// Maximum gap between requests of one streak, in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Cooldown after reaching the limit, in milliseconds
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Key namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Print verdicts as JSON lines
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct VerdictLine<'a> {
    caller: &'a str,
    verdict: Verdict,
    status: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    info!("Starting Throttle Guard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => GuardConfig::from_file(path)?,
        None => GuardConfig::default(),
    };

    let guard = Arc::new(Guard::new(config.policy.clone())?);
    guard.configure(PolicyOverrides {
        max_requests: args.max_requests,
        window_ms: args.window_ms,
        cooldown_ms: args.cooldown_ms,
        namespace: args.namespace.clone(),
    })?;

    let policy = guard.policy();
    info!(
        max_requests = policy.max_requests,
        window_ms = policy.window_ms,
        cooldown_ms = policy.cooldown_ms,
        namespace = %policy.namespace,
        "Configuration loaded"
    );

    if config.purge.enabled {
        guard.start_auto_purge(config.purge.interval())?;
    }

    let mut stdout = tokio::io::stdout();
    tokio::select! {
        result = process_lines(&guard, BufReader::new(tokio::io::stdin()), &mut stdout, args.json) => result?,
        _ = shutdown_signal() => {}
    }

    guard.stop_auto_purge();
    info!(tracked = guard.ledger().len(), "Throttle Guard stopped");
    Ok(())
}

/// Evaluate each non-empty input line and write one verdict per line.
async fn process_lines<R, W>(
    guard: &Guard,
    input: R,
    output: &mut W,
    json: bool,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let caller = line.trim();
        if caller.is_empty() {
            continue;
        }

        let verdict = guard.evaluate(caller);
        let rendered = if json {
            serde_json::to_string(&VerdictLine {
                caller,
                verdict,
                status: verdict.status_code(),
            })?
        } else {
            format!("{} {}", verdict, caller)
        };

        output.write_all(rendered.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }

    info!("Input closed");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
