use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration shared by the TUI and the headless runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub interpreter: String,
    pub project_dir: PathBuf,
    pub settings_path: PathBuf,
    pub models_url: String,
    pub save_settings: bool,
    pub user_agent: String,
}

/// Architectures accepted by the training and inference scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Mdx23c,
    Htdemucs,
    SegmModels,
    MelBandRoformer,
    BsRoformer,
}

impl ModelType {
    pub const ALL: [ModelType; 5] = [
        ModelType::Mdx23c,
        ModelType::Htdemucs,
        ModelType::SegmModels,
        ModelType::MelBandRoformer,
        ModelType::BsRoformer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Mdx23c => "mdx23c",
            ModelType::Htdemucs => "htdemucs",
            ModelType::SegmModels => "segm_models",
            ModelType::MelBandRoformer => "mel_band_roformer",
            ModelType::BsRoformer => "bs_roformer",
        }
    }

    /// Step through the choice list, wrapping at both ends. `None` is the
    /// "nothing selected" slot before the first entry.
    pub fn cycle(current: Option<ModelType>, forward: bool) -> Option<ModelType> {
        let n = Self::ALL.len() + 1;
        let idx = match current {
            None => 0,
            Some(m) => Self::ALL.iter().position(|x| *x == m).map_or(0, |i| i + 1),
        };
        let next = if forward { (idx + 1) % n } else { (idx + n - 1) % n };
        if next == 0 {
            None
        } else {
            Some(Self::ALL[next - 1])
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown model type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[value(name = "train")]
    Training,
    #[value(name = "infer")]
    Inference,
}

impl JobKind {
    pub fn script(self) -> &'static str {
        match self {
            JobKind::Training => "train.py",
            JobKind::Inference => "inference.py",
        }
    }

    pub fn output_title(self) -> &'static str {
        match self {
            JobKind::Training => "Training Output",
            JobKind::Inference => "Inference Output",
        }
    }
}

/// A validated training submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRequest {
    pub model_type: ModelType,
    pub config_path: String,
    pub start_checkpoint: Option<String>,
    pub results_path: String,
    pub data_paths: Vec<String>,
    pub valid_paths: Vec<String>,
    pub num_workers: String,
    pub device_ids: String,
}

/// A validated inference submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub model_type: ModelType,
    pub config_path: String,
    pub start_checkpoint: Option<String>,
    pub input_folder: String,
    pub store_dir: String,
    pub extract_instrumental: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    Training(TrainingRequest),
    Inference(InferenceRequest),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Training(_) => JobKind::Training,
            JobRequest::Inference(_) => JobKind::Inference,
        }
    }

    /// Folder the "open output folder" action points at.
    pub fn output_dir(&self) -> &str {
        match self {
            JobRequest::Training(r) => &r.results_path,
            JobRequest::Inference(r) => &r.store_dir,
        }
    }
}

/// Ordered argv for one external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Full token sequence, program first.
    pub fn tokens(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tok) in self.tokens().into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if tok.is_empty() || tok.contains(char::is_whitespace) || tok.contains('"') {
                write!(f, "\"{}\"", tok.replace('"', "\\\""))?;
            } else {
                f.write_str(tok)?;
            }
        }
        Ok(())
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed { code: i32 },
    Errored { message: String },
    Cancelled,
}

impl JobOutcome {
    /// The single terminal line shown after the child's own output.
    pub fn terminal_line(&self) -> String {
        match self {
            JobOutcome::Completed => "Process completed successfully!".to_string(),
            JobOutcome::Failed { code } => format!("Process failed with return code {code}"),
            JobOutcome::Errored { message } => format!("An error occurred: {message}"),
            JobOutcome::Cancelled => "Process cancelled by user".to_string(),
        }
    }

    /// Exit code for the headless runner.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobOutcome::Completed => 0,
            JobOutcome::Failed { code } if *code > 0 => *code,
            JobOutcome::Failed { .. } | JobOutcome::Errored { .. } => 1,
            JobOutcome::Cancelled => 130,
        }
    }
}

/// Lifecycle of one launched job as seen by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed {
        code: i32,
    },
    Errored {
        message: String,
    },
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Idle | JobState::Running)
    }

    pub fn label(&self) -> String {
        match self {
            JobState::Idle => "idle".into(),
            JobState::Running => "running".into(),
            JobState::Completed => "completed".into(),
            JobState::Failed { code } => format!("failed ({code})"),
            JobState::Errored { .. } => "error".into(),
            JobState::Cancelled => "cancelled".into(),
        }
    }
}

impl From<&JobOutcome> for JobState {
    fn from(o: &JobOutcome) -> Self {
        match o {
            JobOutcome::Completed => JobState::Completed,
            JobOutcome::Failed { code } => JobState::Failed { code: *code },
            JobOutcome::Errored { message } => JobState::Errored {
                message: message.clone(),
            },
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Events a job's producer pushes onto its output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Spawned { pid: Option<u32> },
    Line { text: String },
    Finished { outcome: JobOutcome },
}
