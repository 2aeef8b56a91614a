//! Run lifecycle controller.
//!
//! Owns the run state machine (idle, countdown, running, finished/aborted) and the single
//! active worker, and emits events for presentation layers. Everything here runs on one
//! tokio task; the worker's blocking loop lives on the blocking pool and reports back
//! over its own channel.

use super::summary::{terminal_line, RunRecord};
use crate::engine::{self, InjectorFactory, WorkerHandle};
use crate::model::{
    RunConfig, RunState, SendJob, TerminalEvent, UiEvent, WorkerEvent, SILENT_EXIT_MESSAGE,
};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};

/// Commands emitted by UI layers to control runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UiCommand {
    Start,
    Stop,
    QuickTest,
    Quit,
}

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const QUICK_TEST_DELAY: Duration = Duration::from_secs(3);
/// How long a stop-before-exit may take before the user is told it is still pending.
const STOP_WATCHDOG: Duration = Duration::from_secs(3);

/// A launched worker plus what we know about its progress.
struct ActiveRun {
    worker: WorkerHandle,
    record: RunRecord,
}

/// A quick test waiting out its delay or typing on the blocking pool.
struct PendingQuickTest {
    cancel: Arc<AtomicBool>,
    join: tokio::task::JoinHandle<()>,
}

pub(crate) struct RunController {
    config_rx: watch::Receiver<RunConfig>,
    factory: Arc<dyn InjectorFactory>,
    ui_tx: UnboundedSender<UiEvent>,
    state: RunState,
    countdown_left: u32,
    countdown: Option<Interval>,
    run: Option<ActiveRun>,
    quick_test: Option<PendingQuickTest>,
    quick_test_delay: Duration,
}

impl RunController {
    /// `config_rx` always holds the current form values; it is read at start and again
    /// when a countdown expires.
    pub fn new(
        config_rx: watch::Receiver<RunConfig>,
        factory: Arc<dyn InjectorFactory>,
        ui_tx: UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            config_rx,
            factory,
            ui_tx,
            state: RunState::Idle,
            countdown_left: 0,
            countdown: None,
            run: None,
            quick_test: None,
            quick_test_delay: QUICK_TEST_DELAY,
        }
    }

    #[cfg(test)]
    fn with_quick_test_delay(mut self, delay: Duration) -> Self {
        self.quick_test_delay = delay;
        self
    }

    #[cfg(test)]
    fn state(&self) -> RunState {
        self.state
    }

    fn emit(&self, ev: UiEvent) {
        let _ = self.ui_tx.send(ev);
    }

    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.emit(UiEvent::Log(line));
    }

    fn set_state(&mut self, state: RunState) {
        tracing::debug!(from = ?self.state, to = ?state, "run state");
        self.state = state;
        self.emit(UiEvent::State(state));
    }

    pub fn start_run(&mut self) {
        if self.state != RunState::Idle {
            self.log("A run is already in progress.");
            return;
        }

        let cfg = self.config_rx.borrow().clone();
        let job = match cfg.validate() {
            Ok(job) => job,
            Err(e) => {
                self.log(format!("Validation: {e}"));
                return;
            }
        };

        self.emit(UiEvent::Progress {
            sent: 0,
            total: job.total,
        });
        self.log(format!(
            "Configured: message='{}', count={}, delay={:.2}s",
            job.preview(),
            job.total,
            job.delay.as_secs_f64()
        ));

        if cfg.prep_seconds > 0 {
            self.countdown_left = cfg.prep_seconds;
            let mut interval =
                tokio::time::interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.countdown = Some(interval);
            self.set_state(RunState::CountingDown);
            self.emit(UiEvent::Countdown(self.countdown_left));
        } else {
            self.emit(UiEvent::Countdown(0));
            self.launch(job);
        }
    }

    fn tick_countdown(&mut self) {
        self.countdown_left = self.countdown_left.saturating_sub(1);
        if self.countdown_left > 0 {
            self.emit(UiEvent::Countdown(self.countdown_left));
            return;
        }

        self.countdown = None;
        self.emit(UiEvent::Countdown(0));

        // The form may have changed during the countdown; launch with what it says now.
        let cfg = self.config_rx.borrow().clone();
        match cfg.validate() {
            Ok(job) => {
                self.emit(UiEvent::Progress {
                    sent: 0,
                    total: job.total,
                });
                self.launch(job);
            }
            Err(e) => {
                self.log(format!("Run cancelled: {e}"));
                self.set_state(RunState::Idle);
            }
        }
    }

    fn launch(&mut self, job: SendJob) {
        let worker = engine::spawn_worker(job.clone(), self.factory.clone());
        self.run = Some(ActiveRun {
            worker,
            record: RunRecord::begin(job),
        });
        self.set_state(RunState::Running);
        self.log("Worker started. Press Esc or move the mouse to the top-left corner to abort.");
    }

    pub fn stop_run(&mut self) {
        match self.state {
            RunState::Running => {
                let Some(run) = &self.run else {
                    self.log("Nothing is running to stop.");
                    return;
                };
                if run.worker.cancel.swap(true, Ordering::SeqCst) {
                    self.log("Stop already requested.");
                } else {
                    self.log("Stop requested by user...");
                }
            }
            RunState::CountingDown => {
                self.countdown = None;
                self.log("Countdown cancelled.");
                self.set_state(RunState::Idle);
            }
            _ => self.log("Nothing is running to stop."),
        }
    }

    fn on_worker_event(&mut self, ev: Option<WorkerEvent>) {
        match ev {
            Some(WorkerEvent::Progress { sent }) => {
                let Some(run) = &mut self.run else {
                    return;
                };
                run.record.sent = sent;
                let total = run.record.job.total;
                self.emit(UiEvent::Progress { sent, total });
            }
            Some(WorkerEvent::Terminal(terminal)) => self.finish(terminal),
            None => {
                // Channel closed without a terminal event: the worker died (panic or similar).
                tracing::warn!("worker exited without a terminal event");
                self.finish(TerminalEvent::Aborted(SILENT_EXIT_MESSAGE.into()));
            }
        }
    }

    fn finish(&mut self, terminal: TerminalEvent) {
        let Some(run) = self.run.take() else {
            return;
        };
        self.log(terminal_line(&terminal));
        let summary = run.record.summarize(&terminal);
        let join = run.worker.join;
        tokio::spawn(async move {
            if let Err(e) = join.await {
                tracing::error!("worker task failed: {e}");
            }
        });
        self.set_state(if terminal.is_finished() {
            RunState::Finished
        } else {
            RunState::Aborted
        });
        self.emit(UiEvent::RunEnded(Box::new(summary)));
        self.set_state(RunState::Idle);
    }

    /// Type a fixed test string after a short delay, independent of the run state machine.
    pub fn quick_test(&mut self) {
        if matches!(&self.quick_test, Some(qt) if !qt.join.is_finished()) {
            self.log("A quick test is already pending.");
            return;
        }
        self.log(format!(
            "Performing quick type test in {} seconds. Place the cursor into the target input.",
            self.quick_test_delay.as_secs()
        ));
        let factory = self.factory.clone();
        let ui_tx = self.ui_tx.clone();
        let delay = self.quick_test_delay;
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let join = tokio::task::spawn_blocking(move || {
            let line = engine::run_quick_test(factory.as_ref(), delay, &flag);
            tracing::info!("{line}");
            let _ = ui_tx.send(UiEvent::Log(line));
        });
        self.quick_test = Some(PendingQuickTest { cancel, join });
    }

    /// Begin shutting down. Returns true when nothing is left to wait for.
    fn begin_shutdown(&mut self) -> bool {
        if let Some(qt) = &self.quick_test {
            qt.cancel.store(true, Ordering::SeqCst);
        }
        match self.state {
            RunState::CountingDown => {
                self.countdown = None;
                self.set_state(RunState::Idle);
                true
            }
            _ => match &self.run {
                Some(run) => {
                    run.worker.cancel.store(true, Ordering::SeqCst);
                    self.log("Stopping before exit…");
                    false
                }
                None => true,
            },
        }
    }
}

async fn next_tick(countdown: &mut Option<Interval>) {
    match countdown {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}

async fn next_worker_event(run: &mut Option<ActiveRun>) -> Option<WorkerEvent> {
    match run {
        Some(run) => run.worker.events.recv().await,
        None => futures::future::pending().await,
    }
}

async fn watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

/// Drive the controller from UI commands, countdown ticks and worker events until quit.
pub(crate) async fn run_controller(
    mut ctrl: RunController,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut quit_pending = false;
    let mut stop_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Start) => ctrl.start_run(),
                    Some(UiCommand::Stop) => ctrl.stop_run(),
                    Some(UiCommand::QuickTest) => ctrl.quick_test(),
                    Some(UiCommand::Quit) | None => {
                        if ctrl.begin_shutdown() {
                            break;
                        }
                        quit_pending = true;
                        stop_deadline = Some(Instant::now() + STOP_WATCHDOG);
                    }
                }
            }
            _ = next_tick(&mut ctrl.countdown) => ctrl.tick_countdown(),
            ev = next_worker_event(&mut ctrl.run) => {
                ctrl.on_worker_event(ev);
                if quit_pending && ctrl.run.is_none() {
                    break;
                }
            }
            // A blocked injection call can hold up the stop; keep the user informed.
            _ = watchdog(stop_deadline) => {
                ctrl.log("Still stopping…");
                stop_deadline = None;
            }
        }
    }

    // A cancelled quick test returns within one poll interval; never leave it behind.
    if let Some(qt) = ctrl.quick_test.take() {
        if let Err(e) = qt.join.await {
            tracing::error!("quick test task failed: {e}");
        }
    }

    Ok(())
}
