//! Text summary builder for CLI output.
//!
//! Formats a finished run and timestamped log lines for humans.

use crate::model::{Outcome, RunSummary};
use std::time::Duration;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(summary: &RunSummary) -> TextSummary {
    let outcome = match summary.outcome {
        Outcome::Finished => "finished",
        Outcome::Aborted => "aborted",
    };
    // humantime prints every unit down to nanoseconds; millisecond precision is enough.
    let elapsed = Duration::from_millis(summary.elapsed.as_millis() as u64);

    let lines = vec![
        format!("Outcome: {outcome} ({})", summary.detail),
        format!("Message: {}", summary.message),
        format!("Sent: {} / {}", summary.sent, summary.total),
        format!("Delay: {:.2} s", summary.delay_seconds),
        format!("Elapsed: {}", humantime::format_duration(elapsed)),
        format!("Started: {}", summary.started_utc),
    ];
    TextSummary { lines }
}

/// Prefix a log line with the local wall-clock time, `[HH:MM:SS]`.
pub(crate) fn timestamped(line: &str) -> String {
    let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    match now.format(fmt) {
        Ok(ts) => format!("[{ts}] {line}"),
        Err(_) => line.to_string(),
    }
}
