use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

fn builder(default_level: &str) -> Builder {
    Builder::from_env(Env::default().default_filter_or(default_level))
}

/// Where the TUI writes its log, since the terminal itself is taken.
pub fn log_file_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("msst-launcher").join("launcher.log"))
}

/// Log to a file, for when the TUI owns the terminal. Without a usable data
/// directory logging stays off.
pub fn init_file_logger() -> Result<Option<PathBuf>> {
    let Some(path) = log_file_path() else {
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    builder("info")
        .target(Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()
        .context("install logger")?;
    Ok(Some(path))
}

/// Log to stderr, for the headless runner. Quieter by default so the job's
/// own output stays readable.
pub fn init_stderr_logger() {
    let _ = builder("warn").target(Target::Stderr).try_init();
}
