mod lines;

use crate::model::{CommandLine, JobEvent, JobOutcome};
use bytes::BytesMut;
use lines::OutputLineCodec;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Kill the child and report the job as cancelled
    Cancel,
}

/// Runs one external command and streams its output.
pub struct JobEngine {
    command: CommandLine,
    working_dir: PathBuf,
}

fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    -1
}

/// Read the child's combined output until every writer has closed, sending
/// one string per line. Runs on its own thread since the pipe is blocking.
fn pump_lines<R: Read>(mut reader: R, line_tx: mpsc::UnboundedSender<String>) -> io::Result<()> {
    let mut codec = OutputLineCodec::default();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        buf.extend_from_slice(&chunk[..n]);
        while let Some(line) = codec.decode(&mut buf)? {
            if line_tx.send(line).is_err() {
                return Ok(());
            }
        }
    }
    while let Some(line) = codec.decode_eof(&mut buf)? {
        let _ = line_tx.send(line);
    }
    Ok(())
}

impl JobEngine {
    pub fn new(command: CommandLine, working_dir: PathBuf) -> Self {
        Self {
            command,
            working_dir,
        }
    }

    /// Run the child to completion. Every output line is sent as
    /// [`JobEvent::Line`] in the order the child wrote it, followed by exactly
    /// one [`JobEvent::Finished`]. Send failures (the consumer went away) are
    /// ignored; the child still runs to completion.
    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<JobEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> JobOutcome {
        let outcome = self.drive(&event_tx, &mut control_rx).await;
        match &outcome {
            JobOutcome::Completed => log::info!("job `{}` completed", self.command),
            other => log::warn!("job `{}` ended: {}", self.command, other.terminal_line()),
        }
        let _ = event_tx.send(JobEvent::Finished {
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn drive(
        &self,
        event_tx: &mpsc::UnboundedSender<JobEvent>,
        control_rx: &mut mpsc::UnboundedReceiver<EngineControl>,
    ) -> JobOutcome {
        // One pipe shared by stdout and stderr keeps the child's write order.
        let (reader, writer) = match io::pipe() {
            Ok(p) => p,
            Err(e) => return self.spawn_failed(e),
        };
        let stderr_writer = match writer.try_clone() {
            Ok(w) => w,
            Err(e) => return self.spawn_failed(e),
        };

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .current_dir(&self.working_dir)
            // Python block-buffers stdout into a pipe; keep output live.
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let spawned = cmd.spawn();
        // The command still owns the parent's copies of the write end; the
        // reader only sees EOF once they are closed.
        drop(cmd);
        let mut child = match spawned {
            Ok(c) => c,
            Err(e) => return self.spawn_failed(e),
        };
        log::info!("spawned `{}` (pid {:?})", self.command, child.id());
        let _ = event_tx.send(JobEvent::Spawned { pid: child.id() });

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let reader_thread = std::thread::Builder::new()
            .name("job-output".into())
            .spawn(move || {
                if let Err(e) = pump_lines(reader, line_tx) {
                    log::warn!("output read failed: {e}");
                }
            });
        if let Err(e) = reader_thread {
            log::warn!("could not start output reader: {e}");
        }

        let mut control_open = true;
        let mut cancelled = false;

        loop {
            tokio::select! {
                line = line_rx.recv() => match line {
                    Some(text) => {
                        let _ = event_tx.send(JobEvent::Line { text });
                    }
                    None => break,
                },
                ctrl = control_rx.recv(), if control_open => match ctrl {
                    Some(EngineControl::Cancel) => {
                        log::info!("cancelling `{}`", self.command);
                        if let Err(e) = child.start_kill() {
                            log::warn!("kill failed: {e}");
                        }
                        cancelled = true;
                        // Grandchildren may hold the pipe open; stop reading here.
                        break;
                    }
                    None => control_open = false,
                },
            }
        }

        match child.wait().await {
            Ok(_) if cancelled => JobOutcome::Cancelled,
            Ok(status) if status.success() => JobOutcome::Completed,
            Ok(status) => JobOutcome::Failed {
                code: exit_code(&status),
            },
            Err(e) => JobOutcome::Errored {
                message: e.to_string(),
            },
        }
    }

    fn spawn_failed(&self, e: io::Error) -> JobOutcome {
        log::error!("failed to spawn `{}`: {e}", self.command);
        JobOutcome::Errored {
            message: e.to_string(),
        }
    }
}
