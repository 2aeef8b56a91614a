//! Post-run bookkeeping.
//!
//! Turns a finished run into the `RunSummary` that presentation layers show or print.

use crate::model::{Outcome, RunSummary, SendJob, TerminalEvent};
use std::time::Instant;

/// Bookkeeping for the run currently held by the controller.
pub(crate) struct RunRecord {
    pub job: SendJob,
    pub sent: u32,
    pub started_utc: String,
    pub started: Instant,
}

impl RunRecord {
    pub fn begin(job: SendJob) -> Self {
        Self {
            job,
            sent: 0,
            started_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            started: Instant::now(),
        }
    }

    pub fn summarize(&self, terminal: &TerminalEvent) -> RunSummary {
        RunSummary {
            started_utc: self.started_utc.clone(),
            message: self.job.preview(),
            sent: self.sent,
            total: self.job.total,
            delay_seconds: self.job.delay.as_secs_f64(),
            outcome: if terminal.is_finished() {
                Outcome::Finished
            } else {
                Outcome::Aborted
            },
            detail: terminal.message().to_string(),
            elapsed: self.started.elapsed(),
        }
    }
}

/// The log line announcing a terminal event.
pub(crate) fn terminal_line(terminal: &TerminalEvent) -> String {
    match terminal {
        TerminalEvent::Finished(msg) => format!("✅ {msg}"),
        TerminalEvent::Aborted(reason) => format!("⛔ {reason}"),
    }
}
