use crate::bridge;
use crate::catalog::MODELS_URL;
use crate::engine::{EngineControl, JobEngine};
use crate::model::{JobEvent, JobKind, LaunchConfig};
use crate::orchestrator;
use crate::settings::{Settings, DEFAULT_SETTINGS_FILE};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "msst-launcher",
    version,
    about = "Launch and monitor music source separation training and inference runs"
)]
pub struct Cli {
    /// Interpreter used to run train.py / inference.py
    #[arg(long, default_value = "python")]
    pub python: String,

    /// Directory containing train.py and inference.py; jobs run from here
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Settings file holding the last-used form values
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,

    /// Page listing downloadable checkpoints and configs
    #[arg(long, default_value = MODELS_URL)]
    pub models_url: String,

    /// Run the saved training or inference form without the TUI
    #[arg(long, value_enum)]
    pub run: Option<JobKind>,

    /// With --run: print the command that would be launched and exit
    #[arg(long, requires = "run")]
    pub print_command: bool,

    /// With --run: print job events as JSON lines
    #[arg(long, requires = "run")]
    pub json: bool,

    /// Do not write the settings file on submit
    #[arg(long)]
    pub no_save: bool,
}

/// Dispatch to the TUI or the headless runner. Returns the process exit code.
pub async fn run(args: Cli) -> Result<i32> {
    match args.run {
        Some(kind) => run_text(args, kind).await,
        None => {
            #[cfg(feature = "tui")]
            {
                crate::tui::run(build_config(&args)).await?;
                Ok(0)
            }
            #[cfg(not(feature = "tui"))]
            {
                Err(anyhow::anyhow!(
                    "built without TUI support; use --run train or --run infer"
                ))
            }
        }
    }
}

/// Build a `LaunchConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> LaunchConfig {
    LaunchConfig {
        interpreter: args.python.clone(),
        project_dir: args.project_dir.clone(),
        settings_path: args.settings.clone(),
        models_url: args.models_url.clone(),
        save_settings: !args.no_save,
        user_agent: format!("msst-launcher/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Run the saved form for `kind`, streaming the child's output to stdout.
async fn run_text(args: Cli, kind: JobKind) -> Result<i32> {
    crate::logging::init_stderr_logger();
    let cfg = build_config(&args);
    let settings = Settings::load(&cfg.settings_path).context("load settings")?;
    let training = settings.training_form();
    let inference = settings.inference_form();

    if args.print_command {
        let request = match kind {
            JobKind::Training => training.validate().map(crate::model::JobRequest::Training),
            JobKind::Inference => inference.validate().map(crate::model::JobRequest::Inference),
        };
        return match request {
            Ok(r) => {
                println!("{}", r.to_command(&cfg.interpreter));
                Ok(0)
            }
            Err(e) => {
                eprintln!("{e}");
                Ok(1)
            }
        };
    }

    let (out_tx, out_handle) = spawn_output_writer();
    let submission = match orchestrator::submit(&cfg, kind, &training, &inference) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("invalid {kind:?} form: {} missing", e.field());
            let _ = out_tx.send(OutputLine::Stderr(e.to_string()));
            drop(out_tx);
            let _ = out_handle.await;
            return Ok(1);
        }
    };
    if let Some(msg) = submission.save_error.as_ref() {
        let _ = out_tx.send(OutputLine::Stderr(msg.clone()));
    }

    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<JobEvent>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    let engine = JobEngine::new(submission.command.clone(), cfg.project_dir.clone());
    let handle = tokio::spawn(engine.run(evt_tx, ctrl_rx));

    // Ctrl-C stops the child instead of orphaning it.
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_tx.send(EngineControl::Cancel);
        }
    });

    let started = Instant::now();
    let started_utc = crate::text_summary::timestamp_utc();
    let mut line_count = 0usize;
    let json = args.json;
    let outcome = bridge::forward(evt_rx, |ev| {
        if let JobEvent::Line { .. } = ev {
            line_count += 1;
        }
        if json {
            if let Ok(s) = serde_json::to_string(ev) {
                let _ = out_tx.send(OutputLine::Stdout(s));
            }
            return;
        }
        match ev {
            JobEvent::Line { text } => {
                let _ = out_tx.send(OutputLine::Stdout(text.clone()));
            }
            JobEvent::Finished { outcome } => {
                let _ = out_tx.send(OutputLine::Stdout(outcome.terminal_line()));
            }
            JobEvent::Spawned { .. } => {}
        }
    })
    .await;

    handle.await.context("job task failed")?;
    interrupt.abort();

    if !json {
        let summary = crate::text_summary::build_text_summary(
            kind,
            &submission.command,
            &started_utc,
            &outcome,
            line_count,
            started.elapsed(),
        );
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(outcome.exit_code())
}
