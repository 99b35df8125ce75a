//! Hand-offs to the desktop: file manager, browser, clipboard.

use anyhow::{bail, Context, Result};
use std::path::Path;
#[cfg(feature = "tui")]
use std::sync::{mpsc as std_mpsc, OnceLock};
#[cfg(feature = "tui")]
use std::time::Duration;

// Clipboard worker channel, started on first copy
#[cfg(feature = "tui")]
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Open `folder` in the system file manager.
pub fn open_output_folder(folder: &str) -> Result<()> {
    let path = Path::new(folder);
    if folder.is_empty() || !path.exists() {
        bail!("The folder {folder} does not exist.");
    }
    open::that_detached(path).with_context(|| format!("open {}", path.display()))?;
    log::info!("opened output folder {}", path.display());
    Ok(())
}

/// Open `url` in the default browser.
pub fn open_link(url: &str) -> Result<()> {
    open::that_detached(url).with_context(|| format!("open {url}"))?;
    log::info!("opened link {url}");
    Ok(())
}

/// Start the clipboard thread once. Each copy gets its own clipboard handle,
/// held for a couple of seconds so X11/Wayland clipboard managers can read it
/// before the owner goes away.
#[cfg(feature = "tui")]
fn clipboard_sender() -> &'static std_mpsc::Sender<String> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            for text in rx {
                match arboard::Clipboard::new() {
                    Ok(mut clipboard) => match clipboard.set_text(&text) {
                        Ok(()) => std::thread::sleep(Duration::from_secs(2)),
                        Err(e) => log::warn!("clipboard write failed: {e}"),
                    },
                    Err(e) => log::warn!("clipboard unavailable: {e}"),
                }
            }
        });
        tx
    })
}

/// Queue `text` for the clipboard without blocking the caller.
#[cfg(feature = "tui")]
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    clipboard_sender()
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("clipboard thread stopped"))
}
