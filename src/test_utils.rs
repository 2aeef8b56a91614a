//! Test doubles shared by the engine and controller tests.

use crate::engine::{InjectError, Injector, InjectorFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Type(String),
    Key(String),
}

#[derive(Default)]
struct Script {
    actions: Vec<Action>,
    /// Cycles whose key press has completed.
    cycles: u32,
    connect_error: Option<String>,
    fail_on: Option<(u32, InjectError)>,
    panic_on: Option<u32>,
    cancel_after: Option<(u32, Arc<AtomicBool>)>,
    gate: Option<(u32, mpsc::UnboundedSender<()>, std_mpsc::Receiver<()>)>,
}

/// Holds an injector inside one cycle's `type_text` until released (or dropped).
pub struct Gate {
    entered: mpsc::UnboundedReceiver<()>,
    release: std_mpsc::Sender<()>,
}

impl Gate {
    /// Resolves once the worker is blocked inside the gated cycle.
    pub async fn entered(&mut self) {
        let _ = self.entered.recv().await;
    }

    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

/// Injector factory that records every action and can be scripted to misbehave.
///
/// A cycle is a `type_text` followed by a `press_key`; cycle numbers are 1-based.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFactory {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    /// Text of every `type_text` call, in order.
    pub fn typed(&self) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::Type(t) => Some(t.clone()),
                Action::Key(_) => None,
            })
            .collect()
    }

    pub fn fail_connect(&self, reason: &str) {
        self.lock().connect_error = Some(reason.to_string());
    }

    /// Fail the `type_text` call of `cycle` with `err`.
    pub fn fail_on_cycle(&self, cycle: u32, err: InjectError) {
        self.lock().fail_on = Some((cycle, err));
    }

    /// Panic inside the `type_text` call of `cycle`.
    pub fn panic_on_cycle(&self, cycle: u32) {
        self.lock().panic_on = Some(cycle);
    }

    /// Raise `flag` during the key press that completes `cycle`.
    pub fn cancel_after_cycle(&self, cycle: u32, flag: Arc<AtomicBool>) {
        self.lock().cancel_after = Some((cycle, flag));
    }

    /// Block the `type_text` call of `cycle` until the returned gate is released.
    pub fn gate_cycle(&self, cycle: u32) -> Gate {
        let (entered_tx, entered) = mpsc::unbounded_channel();
        let (release, release_rx) = std_mpsc::channel();
        self.lock().gate = Some((cycle, entered_tx, release_rx));
        Gate { entered, release }
    }
}

impl InjectorFactory for ScriptedFactory {
    fn connect(&self) -> Result<Box<dyn Injector>, InjectError> {
        if let Some(reason) = self.lock().connect_error.clone() {
            return Err(InjectError::Unavailable(reason));
        }
        Ok(Box::new(ScriptedInjector {
            factory: self.clone(),
        }))
    }
}

struct ScriptedInjector {
    factory: ScriptedFactory,
}

impl Injector for ScriptedInjector {
    fn type_text(&mut self, text: &str) -> Result<(), InjectError> {
        let mut script = self.factory.lock();
        let cycle = script.cycles + 1;

        if matches!(script.gate, Some((c, _, _)) if c == cycle) {
            if let Some((_, entered, release)) = script.gate.take() {
                drop(script);
                let _ = entered.send(());
                let _ = release.recv();
                script = self.factory.lock();
            }
        }
        if script.panic_on == Some(cycle) {
            drop(script);
            panic!("scripted injector panic on cycle {cycle}");
        }
        if let Some((c, err)) = script.fail_on.clone() {
            if c == cycle {
                return Err(err);
            }
        }
        script.actions.push(Action::Type(text.to_string()));
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<(), InjectError> {
        let mut script = self.factory.lock();
        script.actions.push(Action::Key(key.to_string()));
        script.cycles += 1;
        if let Some((c, flag)) = &script.cancel_after {
            if *c == script.cycles {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
