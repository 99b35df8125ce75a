//! Submit handling: validate the active form, build its command, persist the
//! forms.

use crate::command::{InferenceForm, TrainingForm, ValidationError};
use crate::model::{CommandLine, JobKind, JobRequest, LaunchConfig};
use crate::settings::Settings;

/// A validated submission, ready to launch.
#[derive(Debug, Clone)]
pub(crate) struct Submission {
    pub request: JobRequest,
    pub command: CommandLine,
    /// Set when the settings write failed; the launch still goes ahead.
    pub save_error: Option<String>,
}

/// Validate the form for `kind` and, only if it passes, write both forms to
/// the settings file. Nothing is saved for an invalid form.
pub(crate) fn submit(
    cfg: &LaunchConfig,
    kind: JobKind,
    training: &TrainingForm,
    inference: &InferenceForm,
) -> Result<Submission, ValidationError> {
    let request = match kind {
        JobKind::Training => JobRequest::Training(training.validate()?),
        JobKind::Inference => JobRequest::Inference(inference.validate()?),
    };
    let command = request.to_command(&cfg.interpreter);

    let save_error = if cfg.save_settings {
        Settings::from_forms(training, inference)
            .save(&cfg.settings_path)
            .err()
            .map(|e| {
                log::warn!("settings not saved: {e:#}");
                format!("Saving settings failed: {e:#}")
            })
    } else {
        None
    };

    Ok(Submission {
        request,
        command,
        save_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelType;
    use std::path::PathBuf;

    fn config(name: &str) -> LaunchConfig {
        let dir = std::env::temp_dir().join(format!(
            "msst-launcher-submit-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        LaunchConfig {
            interpreter: "python".into(),
            project_dir: PathBuf::from("."),
            settings_path: dir.join("settings.json"),
            models_url: String::new(),
            save_settings: true,
            user_agent: "test".into(),
        }
    }

    #[test]
    fn invalid_form_saves_nothing() {
        let cfg = config("invalid");
        let err = submit(
            &cfg,
            JobKind::Inference,
            &TrainingForm::default(),
            &InferenceForm::default(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::ModelType);
        assert!(!cfg.settings_path.exists());
    }

    #[test]
    fn valid_form_saves_both_forms() {
        let cfg = config("valid");
        let training = TrainingForm {
            config_path: "t.yaml".into(),
            ..Default::default()
        };
        let inference = InferenceForm {
            model_type: Some(ModelType::Htdemucs),
            config_path: "i.yaml".into(),
            input_folder: "in".into(),
            store_dir: "out".into(),
            ..Default::default()
        };

        let sub = submit(&cfg, JobKind::Inference, &training, &inference).unwrap();
        assert_eq!(sub.command.args[0], "inference.py");
        assert!(sub.save_error.is_none());

        let saved = Settings::load(&cfg.settings_path).unwrap();
        assert_eq!(saved.config_path, "t.yaml");
        assert_eq!(saved.infer_store_dir, "out");
    }
}
