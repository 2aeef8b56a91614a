use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay substituted when auto-delay is on and the configured delay is zero.
pub const AUTO_DELAY_SECS: f64 = 0.5;

pub const FINISHED_MESSAGE: &str = "All messages sent successfully.";
pub const STOPPED_BY_USER: &str = "Stopped by user.";
pub const FAILSAFE_MESSAGE: &str =
    "Aborted: failsafe triggered (mouse moved to the top-left corner).";
pub const SILENT_EXIT_MESSAGE: &str = "Worker exited without reporting a result.";

/// Values captured from the input form (or CLI flags) at start of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub message: String,
    pub repeat_count: u32,
    pub delay_seconds: f64,
    pub prep_seconds: u32,
    pub auto_delay: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            message: String::new(),
            repeat_count: 10,
            delay_seconds: 0.5,
            prep_seconds: 15,
            auto_delay: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a message to send.")]
    EmptyMessage,
    #[error("Times to send must be at least 1.")]
    RepeatCount,
    #[error("Delay cannot be negative.")]
    NegativeDelay,
    #[error("{field} must be a number (got '{value}').")]
    NotANumber { field: &'static str, value: String },
}

impl RunConfig {
    /// Delay after auto-delay substitution. Not clamped; `validate` rejects negatives.
    pub fn effective_delay_seconds(&self) -> f64 {
        if self.auto_delay && self.delay_seconds == 0.0 {
            AUTO_DELAY_SECS
        } else {
            self.delay_seconds
        }
    }

    /// Check the form values and produce the parameters the worker runs with.
    pub fn validate(&self) -> Result<SendJob, ValidationError> {
        let message = self.message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if self.repeat_count < 1 {
            return Err(ValidationError::RepeatCount);
        }
        let delay = self.effective_delay_seconds();
        if !delay.is_finite() || delay < 0.0 {
            return Err(ValidationError::NegativeDelay);
        }
        Ok(SendJob {
            message: message.to_string(),
            total: self.repeat_count,
            delay: Duration::from_secs_f64(delay),
        })
    }
}

/// Validated parameters for a single run of the injection worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SendJob {
    pub message: String,
    pub total: u32,
    pub delay: Duration,
}

impl SendJob {
    /// Message shortened for log lines.
    pub fn preview(&self) -> String {
        const MAX: usize = 80;
        if self.message.chars().count() > MAX {
            let short: String = self.message.chars().take(MAX).collect();
            format!("{short}…")
        } else {
            self.message.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    CountingDown,
    Running,
    Finished,
    Aborted,
}

impl RunState {
    /// Whether a run (countdown included) currently holds the form.
    pub fn is_active(self) -> bool {
        matches!(self, RunState::CountingDown | RunState::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::CountingDown => "Counting down",
            RunState::Running => "Running",
            RunState::Finished => "Finished",
            RunState::Aborted => "Aborted",
        }
    }
}

/// The single event that ends a worker's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Finished(String),
    Aborted(String),
}

impl TerminalEvent {
    pub fn message(&self) -> &str {
        match self {
            TerminalEvent::Finished(m) | TerminalEvent::Aborted(m) => m,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TerminalEvent::Finished(_))
    }
}

/// Events emitted by the injection worker, in order, over its own channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Progress { sent: u32 },
    Terminal(TerminalEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Finished,
    Aborted,
}

/// Record of one completed run, for the status panel and headless output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_utc: String,
    pub message: String,
    pub sent: u32,
    pub total: u32,
    pub delay_seconds: f64,
    pub outcome: Outcome,
    pub detail: String,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Events the controller sends to presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    State(RunState),
    /// Seconds left before the worker launches; 0 means launching now.
    Countdown(u32),
    Progress { sent: u32, total: u32 },
    Log(String),
    RunEnded(Box<RunSummary>),
}
