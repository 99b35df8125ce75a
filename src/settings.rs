//! Last-used form values, persisted as a flat JSON object.

use crate::command::{InferenceForm, TrainingForm, DEFAULT_DEVICE_IDS, DEFAULT_NUM_WORKERS};
use crate::model::ModelType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::mem;
use std::path::Path;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

fn default_num_workers() -> String {
    DEFAULT_NUM_WORKERS.to_string()
}

fn default_device_ids() -> String {
    DEFAULT_DEVICE_IDS.to_string()
}

/// Every form field keyed by its settings name. Missing keys take the
/// per-field default, unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_type: String,
    pub config_path: String,
    pub start_checkpoint: String,
    pub results_path: String,
    pub data_paths: String,
    pub valid_paths: String,
    #[serde(default = "default_num_workers")]
    pub num_workers: String,
    #[serde(default = "default_device_ids")]
    pub device_ids: String,
    pub infer_model_type: String,
    pub infer_config_path: String,
    pub infer_start_checkpoint: String,
    pub infer_input_folder: String,
    pub infer_store_dir: String,
    pub extract_instrumental: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_type: String::new(),
            config_path: String::new(),
            start_checkpoint: String::new(),
            results_path: String::new(),
            data_paths: String::new(),
            valid_paths: String::new(),
            num_workers: default_num_workers(),
            device_ids: default_device_ids(),
            infer_model_type: String::new(),
            infer_config_path: String::new(),
            infer_start_checkpoint: String::new(),
            infer_input_folder: String::new(),
            infer_store_dir: String::new(),
            extract_instrumental: false,
        }
    }
}

fn model_name(m: Option<ModelType>) -> String {
    m.map(|m| m.as_str().to_string()).unwrap_or_default()
}

impl Settings {
    /// Load settings from `path`. A missing or unparsable file yields
    /// defaults; a value of the wrong type only resets its own field.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("read settings {}", path.display()));
            }
        };

        let parsed: Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                log::warn!(
                    "ignoring malformed settings file {}: {e}",
                    path.display()
                );
                return Ok(Self::default());
            }
        };
        Ok(Self::from_json_lenient(parsed, path))
    }

    /// Take each key from `value` whose type matches the field; anything else
    /// keeps its default. Numbers are accepted for text fields.
    fn from_json_lenient(value: Value, path: &Path) -> Self {
        let Value::Object(file) = value else {
            log::warn!(
                "ignoring settings file {}: not a JSON object",
                path.display()
            );
            return Self::default();
        };
        let mut merged = match serde_json::to_value(Self::default()) {
            Ok(Value::Object(m)) => m,
            _ => return Self::default(),
        };

        for (key, v) in file {
            let Some(slot) = merged.get_mut(&key) else {
                continue;
            };
            let same_type = mem::discriminant(&*slot) == mem::discriminant(&v);
            match v {
                Value::Number(n) if slot.is_string() => *slot = Value::String(n.to_string()),
                v if same_type => *slot = v,
                v => log::warn!(
                    "settings {}: ignoring `{key}` = {v}, keeping the default",
                    path.display()
                ),
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }

    /// Write settings via a sibling temp file renamed over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("serialize settings")?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut f = File::create(&tmp)
                .with_context(|| format!("create temp file {}", tmp.display()))?;
            f.write_all(json.as_bytes()).context("write settings")?;
            f.sync_all().context("sync settings")?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} to {}", tmp.display(), path.display()))?;

        log::debug!("saved settings to {}", path.display());
        Ok(())
    }

    pub fn from_forms(training: &TrainingForm, inference: &InferenceForm) -> Self {
        Self {
            model_type: model_name(training.model_type),
            config_path: training.config_path.clone(),
            start_checkpoint: training.start_checkpoint.clone(),
            results_path: training.results_path.clone(),
            data_paths: training.data_paths.clone(),
            valid_paths: training.valid_paths.clone(),
            num_workers: training.num_workers.clone(),
            device_ids: training.device_ids.clone(),
            infer_model_type: model_name(inference.model_type),
            infer_config_path: inference.config_path.clone(),
            infer_start_checkpoint: inference.start_checkpoint.clone(),
            infer_input_folder: inference.input_folder.clone(),
            infer_store_dir: inference.store_dir.clone(),
            extract_instrumental: inference.extract_instrumental,
        }
    }

    /// Unknown model names load as "nothing selected".
    pub fn training_form(&self) -> TrainingForm {
        TrainingForm {
            model_type: self.model_type.parse().ok(),
            config_path: self.config_path.clone(),
            start_checkpoint: self.start_checkpoint.clone(),
            results_path: self.results_path.clone(),
            data_paths: self.data_paths.clone(),
            valid_paths: self.valid_paths.clone(),
            num_workers: self.num_workers.clone(),
            device_ids: self.device_ids.clone(),
        }
    }

    pub fn inference_form(&self) -> InferenceForm {
        InferenceForm {
            model_type: self.infer_model_type.parse().ok(),
            config_path: self.infer_config_path.clone(),
            start_checkpoint: self.infer_start_checkpoint.clone(),
            input_folder: self.infer_input_folder.clone(),
            store_dir: self.infer_store_dir.clone(),
            extract_instrumental: self.extract_instrumental,
        }
    }
}
