use crate::engine::{DryRunFactory, EnigoFactory, InjectorFactory};
use crate::model::{Outcome, RunConfig, RunState, RunSummary, UiEvent};
use crate::orchestrator::{self, RunController, UiCommand};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "message-sender",
    version,
    about = "Type a message into the focused input field, repeatedly, with optional TUI"
)]
pub struct Cli {
    /// Message to type (pre-fills the form in TUI mode)
    #[arg(long, short = 'm', default_value = "")]
    pub message: String,

    /// Times to send the message
    #[arg(long, short = 'n', default_value_t = 10)]
    pub count: u32,

    /// Delay between sends, in seconds
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    pub delay: f64,

    /// Countdown before the first send, in seconds (time to focus the target field)
    #[arg(long, default_value_t = 15)]
    pub prep: u32,

    /// Use a 0.5s delay when --delay is 0. Use --auto-delay false to send back-to-back
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_delay: bool,

    /// Run once with the given flags and exit (no TUI)
    #[arg(long)]
    pub headless: bool,

    /// Print the run summary as JSON (headless only)
    #[arg(long)]
    pub json: bool,

    /// Do not inject any input; log what would be typed instead
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the top-left-corner mouse failsafe
    #[arg(long)]
    pub no_failsafe: bool,

    /// Write diagnostic logs to this file instead of the cache directory
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "message_sender_cli=trace")
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Whether this invocation runs without the TUI.
    pub fn is_headless(&self) -> bool {
        self.headless || cfg!(not(feature = "tui"))
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && !args.is_headless() {
        return Err(anyhow::anyhow!(
            "--json can only be used with --headless. Use --headless --json together."
        ));
    }

    let factory = build_factory(&args);

    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args, factory).await;
        }
    }

    run_headless(args, factory).await
}

/// Build the initial `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        message: args.message.clone(),
        repeat_count: args.count,
        delay_seconds: args.delay,
        prep_seconds: args.prep,
        auto_delay: args.auto_delay,
    }
}

pub fn build_factory(args: &Cli) -> Arc<dyn InjectorFactory> {
    if args.dry_run {
        Arc::new(DryRunFactory)
    } else {
        Arc::new(EnigoFactory {
            failsafe: !args.no_failsafe,
        })
    }
}

/// Run once from CLI flags through the same controller the TUI uses.
async fn run_headless(args: Cli, factory: Arc<dyn InjectorFactory>) -> Result<()> {
    let cfg = build_config(&args);
    cfg.validate().context("invalid run configuration")?;

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // Ctrl-C maps to Stop so the run ends through the normal abort path.
    let stop_tx = cmd_tx.clone();
    let signal_task = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop_tx.send(UiCommand::Stop).is_err() {
                break;
            }
        }
    });

    let res = drive_headless(&args, cfg, factory, cmd_tx, cmd_rx).await;
    signal_task.abort();
    res
}

/// Start one run, stream its progress to stderr and print the outcome to stdout.
///
/// Returns once the run has ended or its countdown was cancelled.
async fn drive_headless(
    args: &Cli,
    cfg: RunConfig,
    factory: Arc<dyn InjectorFactory>,
    cmd_tx: mpsc::UnboundedSender<UiCommand>,
    cmd_rx: mpsc::UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (_config_tx, config_rx) = watch::channel(cfg);

    let controller = RunController::new(config_rx, factory, ui_tx);
    let handle = tokio::spawn(orchestrator::run_controller(controller, cmd_rx));

    let _ = cmd_tx.send(UiCommand::Start);

    let mut summary: Option<RunSummary> = None;
    while let Some(ev) = ui_rx.recv().await {
        match ev {
            // Back to idle without a summary: the countdown was cancelled.
            UiEvent::State(RunState::Idle) if summary.is_none() => {
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            UiEvent::State(_) => {}
            UiEvent::Countdown(n) => {
                let line = if n > 0 {
                    format!("Starting in {n} s… place your cursor in the target input.")
                } else {
                    "Starting now…".to_string()
                };
                let _ = out_tx.send(OutputLine::Stderr(line));
            }
            UiEvent::Progress { sent, total } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Progress: {sent} / {total}")));
            }
            UiEvent::Log(line) => {
                let _ = out_tx.send(OutputLine::Stderr(crate::text_summary::timestamped(
                    &line,
                )));
            }
            UiEvent::RunEnded(s) => {
                summary = Some(*s);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
        }
    }

    handle.await.context("controller task failed")??;

    let Some(summary) = summary else {
        drop(out_tx);
        let _ = out_handle.await;
        return Err(anyhow::anyhow!("Countdown cancelled."));
    };
    if args.json {
        let out = serde_json::to_string_pretty(&summary)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&summary).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    match summary.outcome {
        Outcome::Finished => Ok(()),
        Outcome::Aborted => Err(anyhow::anyhow!("run aborted: {}", summary.detail)),
    }
}
