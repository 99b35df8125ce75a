//! Job lifecycle controller.
//!
//! Owns launch/cancel/shutdown orchestration and emits events for presentation layers.

use super::Submission;
use crate::catalog;
use crate::engine::{EngineControl, JobEngine};
use crate::model::{CommandLine, JobEvent, JobKind, JobOutcome, LaunchConfig};
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};

pub(crate) type JobId = u64;

/// How long shutdown waits for cancelled children before dropping them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Commands emitted by UI layers.
#[derive(Debug)]
pub(crate) enum UiCommand {
    Launch(Box<Submission>),
    Cancel(JobId),
    FetchModels,
    Quit,
}

/// A freshly started job. The receiver is the job's output queue; whoever
/// holds it is the job's only consumer.
#[derive(Debug)]
pub(crate) struct LaunchedJob {
    pub id: JobId,
    pub kind: JobKind,
    pub command: CommandLine,
    pub output_dir: String,
    pub events: UnboundedReceiver<JobEvent>,
}

/// Events sent back to the UI.
#[derive(Debug)]
pub(crate) enum AppEvent {
    JobLaunched(LaunchedJob),
    ModelsPage(String),
    Info(String),
}

/// Internal handle for a running job task.
struct RunCtx {
    ctrl_tx: UnboundedSender<EngineControl>,
    handle: tokio::task::JoinHandle<()>,
}

/// Jobs run from the project directory, so a relative output folder names a
/// path under it.
fn resolve_output_dir(project_dir: &Path, dir: &str) -> String {
    if dir.is_empty() || Path::new(dir).is_absolute() {
        return dir.to_string();
    }
    project_dir.join(dir).to_string_lossy().into_owned()
}

/// Spawn the engine for one submission. Each job gets its own output channel
/// and control channel; nothing is shared between jobs.
fn start_job(
    cfg: &LaunchConfig,
    id: JobId,
    submission: Submission,
    done_tx: UnboundedSender<(JobId, JobOutcome)>,
) -> (RunCtx, LaunchedJob) {
    let (job_tx, job_rx) = mpsc::unbounded_channel::<JobEvent>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();

    let engine = JobEngine::new(submission.command.clone(), cfg.project_dir.clone());
    let handle = tokio::spawn(async move {
        let outcome = engine.run(job_tx, ctrl_rx).await;
        let _ = done_tx.send((id, outcome));
    });

    let launched = LaunchedJob {
        id,
        kind: submission.request.kind(),
        command: submission.command,
        output_dir: resolve_output_dir(&cfg.project_dir, submission.request.output_dir()),
        events: job_rx,
    };
    (RunCtx { ctrl_tx, handle }, launched)
}

/// Run jobs based on UI commands until the UI quits, then cancel whatever is
/// still running.
pub(crate) async fn run_controller(
    cfg: &LaunchConfig,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let client = catalog::build_client(&cfg.user_agent)?;
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(JobId, JobOutcome)>();
    let mut jobs: HashMap<JobId, RunCtx> = HashMap::new();
    let mut next_id: JobId = 1;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Launch(submission)) => {
                        let id = next_id;
                        next_id += 1;
                        log::info!("launching job {id}: {}", submission.command);
                        let (ctx, launched) = start_job(cfg, id, *submission, done_tx.clone());
                        jobs.insert(id, ctx);
                        let _ = event_tx.send(AppEvent::JobLaunched(launched));
                    }
                    Some(UiCommand::Cancel(id)) => match jobs.get(&id) {
                        Some(ctx) => {
                            let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
                            let _ = event_tx.send(AppEvent::Info(format!("Cancelling job {id}…")));
                        }
                        None => {
                            let _ = event_tx.send(AppEvent::Info(format!("Job {id} is not running")));
                        }
                    },
                    Some(UiCommand::FetchModels) => {
                        let client = client.clone();
                        let url = cfg.models_url.clone();
                        let tx = event_tx.clone();
                        tokio::spawn(async move {
                            let html = catalog::fetch_page(&client, &url).await;
                            let _ = tx.send(AppEvent::ModelsPage(html));
                        });
                    }
                    Some(UiCommand::Quit) | None => break,
                }
            }
            Some((id, outcome)) = done_rx.recv() => {
                jobs.remove(&id);
                log::info!("job {id} finished: {}", outcome.terminal_line());
            }
        }
    }

    shutdown(jobs, &mut done_rx).await;
    Ok(())
}

/// Cancel running jobs and wait briefly for them to report; anything left is
/// aborted, which kills its child on drop.
async fn shutdown(
    mut jobs: HashMap<JobId, RunCtx>,
    done_rx: &mut UnboundedReceiver<(JobId, JobOutcome)>,
) {
    if jobs.is_empty() {
        return;
    }
    log::info!("cancelling {} running job(s) on exit", jobs.len());
    for ctx in jobs.values() {
        let _ = ctx.ctrl_tx.send(EngineControl::Cancel);
    }

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while !jobs.is_empty() {
        tokio::select! {
            Some((id, _)) = done_rx.recv() => {
                jobs.remove(&id);
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    for (id, ctx) in jobs {
        log::warn!("job {id} did not stop in time; aborting");
        ctx.handle.abort();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::{InferenceRequest, JobRequest, ModelType};
    use std::path::PathBuf;

    fn config() -> LaunchConfig {
        LaunchConfig {
            interpreter: "sh".into(),
            project_dir: std::env::temp_dir(),
            settings_path: PathBuf::from("unused.json"),
            models_url: "http://127.0.0.1:9/models.html".into(),
            save_settings: false,
            user_agent: "test".into(),
        }
    }

    fn submission(script: &str) -> Submission {
        Submission {
            request: JobRequest::Inference(InferenceRequest {
                model_type: ModelType::Htdemucs,
                config_path: "c.yaml".into(),
                start_checkpoint: None,
                input_folder: "in".into(),
                store_dir: "stems".into(),
                extract_instrumental: false,
            }),
            command: CommandLine {
                program: "sh".into(),
                args: vec!["-c".into(), script.into()],
            },
            save_error: None,
        }
    }

    #[test]
    fn output_dir_is_relative_to_the_project() {
        let project = Path::new("/srv/msst");
        assert_eq!(resolve_output_dir(project, "results"), "/srv/msst/results");
        assert_eq!(resolve_output_dir(project, "./out/vocals"), "/srv/msst/./out/vocals");
        assert_eq!(resolve_output_dir(project, "/data/stems"), "/data/stems");
        assert_eq!(resolve_output_dir(project, ""), "");
    }

    async fn next_launch(rx: &mut UnboundedReceiver<AppEvent>) -> LaunchedJob {
        loop {
            match rx.recv().await {
                Some(AppEvent::JobLaunched(job)) => return job,
                Some(_) => continue,
                None => panic!("controller stopped"),
            }
        }
    }

    #[tokio::test]
    async fn concurrent_jobs_get_independent_queues() {
        let cfg = config();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(async move { run_controller(&cfg, event_tx, cmd_rx).await });

        cmd_tx
            .send(UiCommand::Launch(Box::new(submission("echo first"))))
            .unwrap();
        cmd_tx
            .send(UiCommand::Launch(Box::new(submission("echo second; exit 2"))))
            .unwrap();

        let a = next_launch(&mut event_rx).await;
        let b = next_launch(&mut event_rx).await;
        assert_ne!(a.id, b.id);
        assert_eq!(
            a.output_dir,
            std::env::temp_dir().join("stems").to_string_lossy()
        );
        assert_eq!(a.kind, JobKind::Inference);

        let mut a_lines = Vec::new();
        let a_out = crate::bridge::forward(a.events, |ev| {
            if let JobEvent::Line { text } = ev {
                a_lines.push(text.clone());
            }
        })
        .await;
        let b_out = crate::bridge::forward(b.events, |_| {}).await;

        assert_eq!(a_out, JobOutcome::Completed);
        assert_eq!(a_lines, vec!["first"]);
        assert_eq!(b_out, JobOutcome::Failed { code: 2 });

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn quit_cancels_running_jobs() {
        let cfg = config();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(async move { run_controller(&cfg, event_tx, cmd_rx).await });

        cmd_tx
            .send(UiCommand::Launch(Box::new(submission("echo up; exec sleep 30"))))
            .unwrap();
        let job = next_launch(&mut event_rx).await;
        cmd_tx.send(UiCommand::Quit).unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            crate::bridge::forward(job.events, |_| {}),
        )
        .await
        .expect("job outlived quit");
        assert_eq!(outcome, JobOutcome::Cancelled);
        controller.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn models_fetch_failure_becomes_error_page() {
        let cfg = config();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(async move { run_controller(&cfg, event_tx, cmd_rx).await });

        cmd_tx.send(UiCommand::FetchModels).unwrap();
        let html = loop {
            match tokio::time::timeout(Duration::from_secs(15), event_rx.recv())
                .await
                .expect("no models page")
            {
                Some(AppEvent::ModelsPage(html)) => break html,
                Some(_) => continue,
                None => panic!("controller stopped"),
            }
        };
        assert!(html.contains("An error occurred while fetching the content"));

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }
}
