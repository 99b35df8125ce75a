//! Text summary builder for headless output.
//!
//! Formats the human-readable lines printed after a job ends in text mode.

use crate::model::{CommandLine, JobKind, JobOutcome};
use std::time::Duration;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Round to whole seconds so humantime prints `1m 5s`, not nanoseconds.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}

/// Wall-clock start stamp in the same RFC 3339 form the logs use.
pub(crate) fn timestamp_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Build a summary of a finished job.
pub(crate) fn build_text_summary(
    kind: JobKind,
    command: &CommandLine,
    started_utc: &str,
    outcome: &JobOutcome,
    line_count: usize,
    elapsed: Duration,
) -> TextSummary {
    let status = match outcome {
        JobOutcome::Completed => "completed".to_string(),
        JobOutcome::Failed { code } => format!("failed (exit code {code})"),
        JobOutcome::Errored { message } => format!("error: {message}"),
        JobOutcome::Cancelled => "cancelled".to_string(),
    };

    TextSummary {
        lines: vec![
            format!("Job: {}", kind.output_title().trim_end_matches(" Output")),
            format!("Command: {command}"),
            format!("Started: {started_utc}"),
            format!("Status: {status}"),
            format!("Output lines: {line_count}"),
            format!("Elapsed: {}", format_elapsed(elapsed)),
        ],
    }
}
