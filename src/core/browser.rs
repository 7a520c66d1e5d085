//! Launching the user's browser for the Cloudflare OAuth page.

use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use crate::error::{Error, Result};
#[cfg(target_os = "linux")]
use crate::{error::ErrorCode, utils::command::find_in_path};

/// Opens a URL in the user's browser.
pub trait BrowserOpener {
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform URL opener and returns without waiting for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

pub fn is_termux() -> bool {
    Path::new("/data/data/com.termux").exists()
}

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let mut cmd = opener_command(url)?;
        let program = cmd.get_program().to_string_lossy().to_string();

        log_status!("login", "Opening browser with {}", program);

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::command_spawn_failed(program, e.to_string()))?;

        // Reap the opener in the background.
        thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn opener_command(url: &str) -> Result<Command> {
    if is_termux() {
        let mut cmd = Command::new("termux-open-url");
        cmd.arg(url).env("TERMUX_API_VERSION", "0.50");
        return Ok(cmd);
    }

    let opener = ["xdg-open", "gnome-open", "kde-open"]
        .into_iter()
        .find(|name| find_in_path(name).is_some())
        .ok_or_else(|| {
            Error::new(
                ErrorCode::DependencyMissing,
                "No URL opener found (xdg-open, gnome-open, kde-open)",
                serde_json::json!({ "tried": ["xdg-open", "gnome-open", "kde-open"] }),
            )
            .with_hint("Install xdg-utils, or open the login URL manually")
        })?;

    let mut cmd = Command::new(opener);
    cmd.arg(url);
    Ok(cmd)
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> Result<Command> {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    Ok(cmd)
}

#[cfg(windows)]
fn opener_command(url: &str) -> Result<Command> {
    let argv = windows_opener_argv(url);
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    Ok(cmd)
}

/// The URL goes to the protocol handler as one argument. `cmd /c start` would treat the
/// `&` separators of the OAuth query string as command separators.
#[cfg_attr(not(windows), allow(dead_code))]
fn windows_opener_argv(url: &str) -> Vec<String> {
    vec![
        "rundll32".to_string(),
        "url.dll,FileProtocolHandler".to_string(),
        url.to_string(),
    ]
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn opener_command(_url: &str) -> Result<Command> {
    Err(Error::internal_unexpected(format!(
        "Opening a browser is not supported on {}",
        std::env::consts::OS
    )))
}
