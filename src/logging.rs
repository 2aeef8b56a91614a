use crate::cli::Cli;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber.
///
/// Diagnostics always go to a log file. Headless runs also print warnings and
/// errors to stderr; the TUI owns the terminal so nothing is written there.
pub fn init_tracing(args: &Cli) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("invalid --log-level '{}'", args.log_level))?,
    };

    let path = match args.log_file.clone() {
        Some(p) => p,
        None => default_log_path().context("could not determine a log directory")?,
    };
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .context("--log-file must name a file")?
        .to_owned();

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create log dir {} failed", dir.display()))?;
    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let console_layer = args.is_headless().then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    tracing::debug!(path = %path.display(), "logging initialised");
    Ok(())
}

fn default_log_path() -> Option<PathBuf> {
    let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    Some(
        base.join("message-sender")
            .join(format!("message-sender.{}.log", std::process::id())),
    )
}
