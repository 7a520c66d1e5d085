use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the install directory created under the user's home.
pub const INSTALL_DIR_NAME: &str = ".bpb-terminal-wizard";

#[cfg(windows)]
const HOME_VAR: &str = "USERPROFILE";
#[cfg(not(windows))]
const HOME_VAR: &str = "HOME";

/// User home directory (`USERPROFILE` on Windows).
pub fn home() -> Result<PathBuf> {
    env::var_os(HOME_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            Error::internal_unexpected(format!("{} environment variable not set", HOME_VAR))
        })
}

/// Wizard config directory (`~/.config/bpb-wizard/`, `%APPDATA%\bpb-wizard` on Windows).
pub fn config_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var_os("APPDATA")
            .ok_or_else(|| Error::internal_unexpected("APPDATA environment variable not set"))?;
        Ok(PathBuf::from(appdata).join("bpb-wizard"))
    }

    #[cfg(not(windows))]
    {
        Ok(home()?.join(".config").join("bpb-wizard"))
    }
}

/// Optional wizard.json config file path
pub fn wizard_json() -> Result<PathBuf> {
    Ok(config_dir()?.join("wizard.json"))
}

pub fn default_install_dir() -> Result<PathBuf> {
    Ok(home()?.join(INSTALL_DIR_NAME))
}

/// Configured install directory (tilde-expanded), or the default under home.
pub fn resolve_install_dir(configured: Option<&str>) -> Result<PathBuf> {
    match configured.map(str::trim) {
        Some("") => Err(Error::config_invalid_value(
            "defaults.installDir",
            Some(String::new()),
            "Install directory must not be empty",
        )),
        Some(dir) => Ok(PathBuf::from(shellexpand::tilde(dir).to_string())),
        None => default_install_dir(),
    }
}

/// Artifact directory inside an install
pub fn source_dir(install_dir: &Path) -> PathBuf {
    install_dir.join("src")
}

pub fn manifest(install_dir: &Path) -> PathBuf {
    install_dir.join("wrangler.toml")
}

/// JSON manifest left behind by older wizard releases.
pub fn legacy_manifest(install_dir: &Path) -> PathBuf {
    install_dir.join("wrangler.json")
}
