pub mod injector;

pub use injector::{DryRunFactory, EnigoFactory, InjectError, Injector, InjectorFactory};
pub use quick_test::{run_quick_test, QUICK_TEST_TEXT};

use crate::model::{
    SendJob, TerminalEvent, WorkerEvent, FAILSAFE_MESSAGE, FINISHED_MESSAGE, STOPPED_BY_USER,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;

pub const SUBMIT_KEY: &str = "enter";

/// Runs the send loop for one job. Blocking: call it from `spawn_blocking` or a plain thread.
pub struct SendWorker {
    job: SendJob,
}

impl SendWorker {
    pub fn new(job: SendJob) -> Self {
        Self { job }
    }

    /// Connect to the injection capability and run every cycle, emitting exactly one
    /// terminal event before returning.
    pub fn run(
        self,
        factory: &dyn InjectorFactory,
        event_tx: &mpsc::UnboundedSender<WorkerEvent>,
        cancel: &AtomicBool,
    ) -> TerminalEvent {
        let terminal = match factory.connect() {
            Ok(mut injector) => self.send_all(injector.as_mut(), event_tx, cancel),
            Err(e) => abort_for(e),
        };
        let _ = event_tx.send(WorkerEvent::Terminal(terminal.clone()));
        terminal
    }

    fn send_all(
        &self,
        injector: &mut dyn Injector,
        event_tx: &mpsc::UnboundedSender<WorkerEvent>,
        cancel: &AtomicBool,
    ) -> TerminalEvent {
        let SendJob {
            message,
            total,
            delay,
        } = &self.job;

        for sent in 1..=*total {
            if cancel.load(Ordering::Relaxed) {
                tracing::info!(sent = sent - 1, total, "worker observed stop request");
                return TerminalEvent::Aborted(STOPPED_BY_USER.into());
            }

            let cycle = injector
                .type_text(message)
                .and_then(|()| injector.press_key(SUBMIT_KEY));
            if let Err(e) = cycle {
                tracing::warn!(cycle = sent, error = %e, "injection failed");
                return abort_for(e);
            }

            let _ = event_tx.send(WorkerEvent::Progress { sent });

            if sent < *total && !delay.is_zero() {
                std::thread::sleep(*delay);
            }
        }

        TerminalEvent::Finished(FINISHED_MESSAGE.into())
    }
}

fn abort_for(e: InjectError) -> TerminalEvent {
    match e {
        InjectError::SafetyInterlock => TerminalEvent::Aborted(FAILSAFE_MESSAGE.into()),
        other => TerminalEvent::Aborted(format!("Error: {other}")),
    }
}

/// Handle to a worker running on the blocking pool.
pub struct WorkerHandle {
    pub cancel: Arc<AtomicBool>,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
    pub join: tokio::task::JoinHandle<TerminalEvent>,
}

/// Launch a worker on tokio's blocking pool with a fresh cancellation flag and event channel.
pub fn spawn_worker(job: SendJob, factory: Arc<dyn InjectorFactory>) -> WorkerHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let (event_tx, events) = mpsc::unbounded_channel::<WorkerEvent>();
    let worker_cancel = cancel.clone();
    let join = tokio::task::spawn_blocking(move || {
        SendWorker::new(job).run(factory.as_ref(), &event_tx, &worker_cancel)
    });
    WorkerHandle {
        cancel,
        events,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Action, ScriptedFactory};
    use std::time::Duration;

    fn job(message: &str, total: u32) -> SendJob {
        SendJob {
            message: message.into(),
            total,
            delay: Duration::ZERO,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> Vec<WorkerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn progress(range: std::ops::RangeInclusive<u32>) -> Vec<WorkerEvent> {
        range.map(|sent| WorkerEvent::Progress { sent }).collect()
    }

    #[test]
    fn emits_progress_for_every_cycle_then_finished() {
        for n in [1u32, 2, 7] {
            let factory = ScriptedFactory::default();
            let (tx, mut rx) = mpsc::unbounded_channel();
            let cancel = AtomicBool::new(false);

            let terminal = SendWorker::new(job("hello", n)).run(&factory, &tx, &cancel);

            let mut expected = progress(1..=n);
            expected.push(WorkerEvent::Terminal(TerminalEvent::Finished(
                FINISHED_MESSAGE.into(),
            )));
            assert_eq!(drain(&mut rx), expected);
            assert!(terminal.is_finished());
            assert_eq!(factory.typed().len(), n as usize);
        }
    }

    #[test]
    fn each_cycle_types_then_presses_enter() {
        let factory = ScriptedFactory::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        SendWorker::new(job("hi", 2)).run(&factory, &tx, &AtomicBool::new(false));
        assert_eq!(
            factory.actions(),
            vec![
                Action::Type("hi".into()),
                Action::Key("enter".into()),
                Action::Type("hi".into()),
                Action::Key("enter".into()),
            ]
        );
    }

    #[test]
    fn cancellation_before_cycle_k_stops_after_k_minus_one() {
        for k in 1u32..=4 {
            let factory = ScriptedFactory::default();
            let cancel = Arc::new(AtomicBool::new(k == 1));
            if k > 1 {
                // Raise the flag while cycle k-1 is being injected.
                factory.cancel_after_cycle(k - 1, cancel.clone());
            }
            let (tx, mut rx) = mpsc::unbounded_channel();

            SendWorker::new(job("x", 4)).run(&factory, &tx, &cancel);

            let mut expected = progress(1..=k - 1);
            expected.push(WorkerEvent::Terminal(TerminalEvent::Aborted(
                STOPPED_BY_USER.into(),
            )));
            assert_eq!(drain(&mut rx), expected, "cancel before cycle {k}");
            assert_eq!(factory.typed().len(), (k - 1) as usize);
        }
    }

    #[test]
    fn safety_interlock_aborts_with_failsafe_message() {
        let factory = ScriptedFactory::default();
        factory.fail_on_cycle(2, InjectError::SafetyInterlock);
        let (tx, mut rx) = mpsc::unbounded_channel();

        SendWorker::new(job("x", 5)).run(&factory, &tx, &AtomicBool::new(false));

        assert_eq!(
            drain(&mut rx),
            vec![
                WorkerEvent::Progress { sent: 1 },
                WorkerEvent::Terminal(TerminalEvent::Aborted(FAILSAFE_MESSAGE.into())),
            ]
        );
    }

    #[test]
    fn other_failures_embed_their_description() {
        let factory = ScriptedFactory::default();
        factory.fail_on_cycle(1, InjectError::Failed("display went away".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let terminal = SendWorker::new(job("x", 3)).run(&factory, &tx, &AtomicBool::new(false));

        assert_eq!(
            terminal,
            TerminalEvent::Aborted("Error: display went away".into())
        );
        assert_eq!(drain(&mut rx), vec![WorkerEvent::Terminal(terminal)]);
    }

    #[test]
    fn connect_failure_is_reported_as_abort() {
        let factory = ScriptedFactory::default();
        factory.fail_connect("no display");
        let (tx, mut rx) = mpsc::unbounded_channel();

        SendWorker::new(job("x", 3)).run(&factory, &tx, &AtomicBool::new(false));

        assert_eq!(
            drain(&mut rx),
            vec![WorkerEvent::Terminal(TerminalEvent::Aborted(
                "Error: input injection unavailable: no display".into()
            ))]
        );
    }

    #[tokio::test]
    async fn spawned_worker_reports_over_its_channel() {
        let factory = Arc::new(ScriptedFactory::default());
        let mut handle = spawn_worker(job("hello", 3), factory.clone());

        let mut events = Vec::new();
        while let Some(ev) = handle.events.recv().await {
            events.push(ev);
        }
        let terminal = handle.join.await.unwrap();

        assert_eq!(events.len(), 4);
        assert_eq!(events[3], WorkerEvent::Terminal(terminal));
        assert_eq!(factory.typed(), vec!["hello", "hello", "hello"]);
    }
}
