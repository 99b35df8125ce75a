//! Consumer half of a job's output channel.
//!
//! The engine task is the only producer. A consumer is either an interactive
//! surface drained once per UI frame ([`drain`]) or the headless printer that
//! awaits the channel directly ([`forward`]). Both stop at the producer's
//! terminal event after flushing everything queued before it.

use crate::model::{JobEvent, JobOutcome};
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};

const LOST_PRODUCER: &str = "job ended without reporting a status";

/// Somewhere job output can be appended.
pub trait OutputSurface {
    /// False once the user has closed the surface.
    fn is_open(&self) -> bool;
    fn append_line(&mut self, line: String);
    fn spawned(&mut self, _pid: Option<u32>) {}
}

/// Result of one drain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drain {
    /// Queue is empty for now; drain again later.
    Pending,
    /// The terminal event was delivered; the consumer is done.
    Finished(JobOutcome),
    /// The surface is gone; remaining output is discarded.
    Detached,
}

/// Move every queued event onto `surface` without blocking.
pub fn drain<S: OutputSurface + ?Sized>(
    rx: &mut UnboundedReceiver<JobEvent>,
    surface: &mut S,
) -> Drain {
    loop {
        if !surface.is_open() {
            return Drain::Detached;
        }
        match rx.try_recv() {
            Ok(JobEvent::Spawned { pid }) => surface.spawned(pid),
            Ok(JobEvent::Line { text }) => surface.append_line(text),
            Ok(JobEvent::Finished { outcome }) => {
                surface.append_line(outcome.terminal_line());
                return Drain::Finished(outcome);
            }
            Err(TryRecvError::Empty) => return Drain::Pending,
            Err(TryRecvError::Disconnected) => {
                let outcome = JobOutcome::Errored {
                    message: LOST_PRODUCER.to_string(),
                };
                surface.append_line(outcome.terminal_line());
                return Drain::Finished(outcome);
            }
        }
    }
}

/// Await events until the terminal one, handing each to `on_event`.
pub async fn forward<F>(mut rx: UnboundedReceiver<JobEvent>, mut on_event: F) -> JobOutcome
where
    F: FnMut(&JobEvent),
{
    while let Some(ev) = rx.recv().await {
        on_event(&ev);
        if let JobEvent::Finished { outcome } = ev {
            return outcome;
        }
    }
    JobOutcome::Errored {
        message: LOST_PRODUCER.to_string(),
    }
}

/// Plain in-memory surface used by the job views.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    pub lines: Vec<String>,
    pub pid: Option<u32>,
    /// Set once the child process exists.
    pub started: bool,
    open: bool,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            pid: None,
            started: false,
            open: true,
        }
    }
}

impl OutputBuffer {
    pub fn close(&mut self) {
        self.open = false;
    }
}

impl OutputSurface for OutputBuffer {
    fn is_open(&self) -> bool {
        self.open
    }

    fn append_line(&mut self, line: String) {
        self.lines.push(line);
    }

    fn spawned(&mut self, pid: Option<u32>) {
        self.pid = pid;
        self.started = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn line(s: &str) -> JobEvent {
        JobEvent::Line { text: s.into() }
    }

    #[test]
    fn drains_fifo_and_stops_at_terminal_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut out = OutputBuffer::default();

        tx.send(JobEvent::Spawned { pid: Some(42) }).unwrap();
        tx.send(line("one")).unwrap();
        tx.send(line("two")).unwrap();
        assert_eq!(drain(&mut rx, &mut out), Drain::Pending);
        assert_eq!(out.pid, Some(42));
        assert!(out.started);

        tx.send(line("three")).unwrap();
        tx.send(JobEvent::Finished {
            outcome: JobOutcome::Completed,
        })
        .unwrap();
        assert_eq!(
            drain(&mut rx, &mut out),
            Drain::Finished(JobOutcome::Completed)
        );
        assert_eq!(
            out.lines,
            vec!["one", "two", "three", "Process completed successfully!"]
        );
    }

    #[test]
    fn closed_surface_detaches_without_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut out = OutputBuffer::default();
        tx.send(line("before close")).unwrap();
        assert_eq!(drain(&mut rx, &mut out), Drain::Pending);

        out.close();
        tx.send(line("after close")).unwrap();
        assert_eq!(drain(&mut rx, &mut out), Drain::Detached);
        assert_eq!(out.lines, vec!["before close"]);

        // The producer keeps sending into a dropped receiver without failing loudly.
        drop(rx);
        assert!(tx.send(line("late")).is_err());
    }

    #[test]
    fn lost_producer_is_reported_once() {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobEvent>();
        let mut out = OutputBuffer::default();
        tx.send(line("partial")).unwrap();
        drop(tx);
        assert!(matches!(
            drain(&mut rx, &mut out),
            Drain::Finished(JobOutcome::Errored { .. })
        ));
        assert_eq!(out.lines.len(), 2);
    }

    #[tokio::test]
    async fn forward_returns_terminal_outcome() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(line("a")).unwrap();
        tx.send(JobEvent::Finished {
            outcome: JobOutcome::Failed { code: 137 },
        })
        .unwrap();
        tx.send(line("never seen")).unwrap();

        let mut seen = Vec::new();
        let outcome = forward(rx, |ev| seen.push(ev.clone())).await;
        assert_eq!(outcome, JobOutcome::Failed { code: 137 });
        assert_eq!(seen.len(), 2);
    }
}
