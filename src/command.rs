//! Form validation and argv construction for the two external scripts.
//!
//! Forms hold exactly what the user typed. Validation turns a form into a
//! [`JobRequest`], reporting the first missing field, and only a validated
//! request can be translated into a [`CommandLine`].

use crate::model::{
    CommandLine, InferenceRequest, JobRequest, ModelType, TrainingRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NUM_WORKERS: &str = "4";
pub const DEFAULT_DEVICE_IDS: &str = "0";

/// First missing required field of a submitted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a model type.")]
    ModelType,
    #[error("Please select a config file.")]
    ConfigPath,
    #[error("Please specify a results path.")]
    ResultsPath,
    #[error("Please specify data paths.")]
    DataPaths,
    #[error("Please specify validation paths.")]
    ValidPaths,
    #[error("Please specify an input folder.")]
    InputFolder,
    #[error("Please specify an output folder.")]
    StoreDir,
}

impl ValidationError {
    /// Settings key of the offending field.
    pub fn field(self) -> &'static str {
        match self {
            ValidationError::ModelType => "model_type",
            ValidationError::ConfigPath => "config_path",
            ValidationError::ResultsPath => "results_path",
            ValidationError::DataPaths => "data_paths",
            ValidationError::ValidPaths => "valid_paths",
            ValidationError::InputFolder => "input_folder",
            ValidationError::StoreDir => "store_dir",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingForm {
    pub model_type: Option<ModelType>,
    pub config_path: String,
    pub start_checkpoint: String,
    pub results_path: String,
    /// `;`-separated list as typed.
    pub data_paths: String,
    /// `;`-separated list as typed.
    pub valid_paths: String,
    pub num_workers: String,
    pub device_ids: String,
}

impl Default for TrainingForm {
    fn default() -> Self {
        Self {
            model_type: None,
            config_path: String::new(),
            start_checkpoint: String::new(),
            results_path: String::new(),
            data_paths: String::new(),
            valid_paths: String::new(),
            num_workers: DEFAULT_NUM_WORKERS.to_string(),
            device_ids: DEFAULT_DEVICE_IDS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceForm {
    pub model_type: Option<ModelType>,
    pub config_path: String,
    pub start_checkpoint: String,
    pub input_folder: String,
    pub store_dir: String,
    pub extract_instrumental: bool,
}

fn required(value: &str, err: ValidationError) -> Result<String, ValidationError> {
    if value.is_empty() {
        Err(err)
    } else {
        Ok(value.to_string())
    }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Split a `;`-separated field. Empty segments are kept so the token count is
/// always `count(';') + 1`.
pub fn split_paths(raw: &str) -> Vec<String> {
    raw.split(';').map(str::to_string).collect()
}

impl TrainingForm {
    pub fn validate(&self) -> Result<TrainingRequest, ValidationError> {
        let model_type = self.model_type.ok_or(ValidationError::ModelType)?;
        let config_path = required(&self.config_path, ValidationError::ConfigPath)?;
        let results_path = required(&self.results_path, ValidationError::ResultsPath)?;
        let data_paths = required(&self.data_paths, ValidationError::DataPaths)?;
        let valid_paths = required(&self.valid_paths, ValidationError::ValidPaths)?;

        Ok(TrainingRequest {
            model_type,
            config_path,
            start_checkpoint: optional(&self.start_checkpoint),
            results_path,
            data_paths: split_paths(&data_paths),
            valid_paths: split_paths(&valid_paths),
            num_workers: self.num_workers.clone(),
            device_ids: self.device_ids.clone(),
        })
    }
}

impl InferenceForm {
    pub fn validate(&self) -> Result<InferenceRequest, ValidationError> {
        let model_type = self.model_type.ok_or(ValidationError::ModelType)?;
        let config_path = required(&self.config_path, ValidationError::ConfigPath)?;
        let input_folder = required(&self.input_folder, ValidationError::InputFolder)?;
        let store_dir = required(&self.store_dir, ValidationError::StoreDir)?;

        Ok(InferenceRequest {
            model_type,
            config_path,
            start_checkpoint: optional(&self.start_checkpoint),
            input_folder,
            store_dir,
            extract_instrumental: self.extract_instrumental,
        })
    }
}

impl JobRequest {
    /// Build the argv for this request. Multi-value paths follow a single
    /// flag (`--data_path A B`), which is what the scripts' `nargs='+'`
    /// arguments expect.
    pub fn to_command(&self, interpreter: &str) -> CommandLine {
        let mut args: Vec<String> = vec![self.kind().script().to_string()];

        match self {
            JobRequest::Training(r) => {
                push_flag(&mut args, "--model_type", r.model_type.as_str());
                push_flag(&mut args, "--config_path", &r.config_path);
                push_flag(&mut args, "--results_path", &r.results_path);
                args.push("--data_path".into());
                args.extend(r.data_paths.iter().cloned());
                args.push("--valid_path".into());
                args.extend(r.valid_paths.iter().cloned());
                push_flag(&mut args, "--num_workers", &r.num_workers);
                push_flag(&mut args, "--device_ids", &r.device_ids);
                if let Some(ckpt) = &r.start_checkpoint {
                    push_flag(&mut args, "--start_check_point", ckpt);
                }
            }
            JobRequest::Inference(r) => {
                push_flag(&mut args, "--model_type", r.model_type.as_str());
                push_flag(&mut args, "--config_path", &r.config_path);
                push_flag(&mut args, "--input_folder", &r.input_folder);
                push_flag(&mut args, "--store_dir", &r.store_dir);
                if let Some(ckpt) = &r.start_checkpoint {
                    push_flag(&mut args, "--start_check_point", ckpt);
                }
                if r.extract_instrumental {
                    args.push("--extract_instrumental".into());
                }
            }
        }

        CommandLine {
            program: interpreter.to_string(),
            args,
        }
    }
}

fn push_flag(args: &mut Vec<String>, name: &str, value: &str) {
    args.push(name.to_string());
    args.push(value.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training_form() -> TrainingForm {
        TrainingForm {
            model_type: Some(ModelType::MelBandRoformer),
            config_path: "configs/vocals.yaml".into(),
            start_checkpoint: String::new(),
            results_path: "results".into(),
            data_paths: "A;B".into(),
            valid_paths: "V".into(),
            ..Default::default()
        }
    }

    fn inference_form() -> InferenceForm {
        InferenceForm {
            model_type: Some(ModelType::BsRoformer),
            config_path: "cfg.yaml".into(),
            start_checkpoint: String::new(),
            input_folder: "in".into(),
            store_dir: "out".into(),
            extract_instrumental: false,
        }
    }

    #[test]
    fn training_reports_first_missing_field_in_order() {
        let empty = TrainingForm::default();
        assert_eq!(empty.validate(), Err(ValidationError::ModelType));

        let mut f = training_form();
        f.config_path.clear();
        f.results_path.clear();
        assert_eq!(f.validate(), Err(ValidationError::ConfigPath));

        let mut f = training_form();
        f.results_path.clear();
        assert_eq!(f.validate(), Err(ValidationError::ResultsPath));

        let mut f = training_form();
        f.data_paths.clear();
        assert_eq!(f.validate(), Err(ValidationError::DataPaths));

        let mut f = training_form();
        f.valid_paths.clear();
        assert_eq!(f.validate(), Err(ValidationError::ValidPaths));
    }

    #[test]
    fn inference_reports_first_missing_field_in_order() {
        let mut f = inference_form();
        f.model_type = None;
        f.store_dir.clear();
        assert_eq!(f.validate(), Err(ValidationError::ModelType));

        let mut f = inference_form();
        f.input_folder.clear();
        f.store_dir.clear();
        assert_eq!(f.validate(), Err(ValidationError::InputFolder));
        assert_eq!(ValidationError::InputFolder.field(), "input_folder");

        let mut f = inference_form();
        f.store_dir.clear();
        assert_eq!(
            f.validate().unwrap_err().to_string(),
            "Please specify an output folder."
        );
    }

    #[test]
    fn training_command_has_documented_order() {
        let req = JobRequest::Training(training_form().validate().unwrap());
        let cmd = req.to_command("python");
        assert_eq!(
            cmd.tokens(),
            vec![
                "python",
                "train.py",
                "--model_type",
                "mel_band_roformer",
                "--config_path",
                "configs/vocals.yaml",
                "--results_path",
                "results",
                "--data_path",
                "A",
                "B",
                "--valid_path",
                "V",
                "--num_workers",
                "4",
                "--device_ids",
                "0",
            ]
        );
    }

    #[test]
    fn checkpoint_flag_only_when_present() {
        let mut f = training_form();
        f.start_checkpoint = "ckpt/model.ckpt".into();
        let cmd = JobRequest::Training(f.validate().unwrap()).to_command("python3");
        let tail: Vec<&str> = cmd.tokens().into_iter().rev().take(2).collect();
        assert_eq!(tail, vec!["ckpt/model.ckpt", "--start_check_point"]);
        assert_eq!(cmd.program, "python3");

        let cmd = JobRequest::Training(training_form().validate().unwrap()).to_command("python");
        assert!(!cmd.args.iter().any(|a| a == "--start_check_point"));
    }

    #[test]
    fn split_paths_keeps_order_and_empty_segments() {
        for raw in ["a", "a;b", "a;;c", "x;y;z;", "/data/one;/data/two;/data/three"] {
            let parts = split_paths(raw);
            assert_eq!(parts.len(), raw.matches(';').count() + 1, "{raw}");
            assert_eq!(parts.join(";"), raw);
        }

        let mut f = training_form();
        f.data_paths = "d1;d2;d3".into();
        f.valid_paths = "v1;v2".into();
        let cmd = JobRequest::Training(f.validate().unwrap()).to_command("python");
        let toks = cmd.tokens();
        let dp = toks.iter().position(|t| *t == "--data_path").unwrap();
        assert_eq!(&toks[dp + 1..dp + 4], &["d1", "d2", "d3"]);
        assert_eq!(toks[dp + 4], "--valid_path");
        assert_eq!(&toks[dp + 5..dp + 7], &["v1", "v2"]);
        assert_eq!(toks.iter().filter(|t| **t == "--data_path").count(), 1);
    }

    #[test]
    fn inference_command_optional_flags() {
        let cmd = JobRequest::Inference(inference_form().validate().unwrap()).to_command("python");
        assert_eq!(
            cmd.tokens(),
            vec![
                "python",
                "inference.py",
                "--model_type",
                "bs_roformer",
                "--config_path",
                "cfg.yaml",
                "--input_folder",
                "in",
                "--store_dir",
                "out",
            ]
        );

        let mut f = inference_form();
        f.start_checkpoint = "m.ckpt".into();
        f.extract_instrumental = true;
        let cmd = JobRequest::Inference(f.validate().unwrap()).to_command("python");
        assert_eq!(
            &cmd.args[cmd.args.len() - 3..],
            &["--start_check_point", "m.ckpt", "--extract_instrumental"]
        );
    }

    #[test]
    fn output_dir_follows_job_kind() {
        let t = JobRequest::Training(training_form().validate().unwrap());
        let i = JobRequest::Inference(inference_form().validate().unwrap());
        assert_eq!(t.output_dir(), "results");
        assert_eq!(i.output_dir(), "out");
    }
}
