//! Local prerequisites: Node.js and a pinned wrangler release.

use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use crate::defaults::Defaults;
use crate::error::{Error, ErrorCode, Result};
use crate::utils::command::{argv, CommandRunner};
use crate::utils::retry::retry;

static NODE_MAJOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?(\d+)").unwrap());

static VERSION_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+\.\d+\.\d+)\b").unwrap());

/// How wrangler is invoked: the global binary, or through npx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WranglerCli {
    prefix: Vec<String>,
}

impl WranglerCli {
    pub fn direct() -> Self {
        Self {
            prefix: vec!["wrangler".to_string()],
        }
    }

    pub fn npx() -> Self {
        Self {
            prefix: vec!["npx".to_string(), "wrangler".to_string()],
        }
    }

    /// `wrangler` when it is on PATH, `npx wrangler` otherwise.
    pub fn resolve(runner: &dyn CommandRunner) -> Self {
        if runner.locate("wrangler").is_some() {
            Self::direct()
        } else {
            log_status!("deps", "'wrangler' not found in PATH, using 'npx wrangler'");
            Self::npx()
        }
    }

    pub fn argv(&self, args: &[&str]) -> Vec<String> {
        self.prefix
            .iter()
            .cloned()
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }

    pub fn display(&self) -> String {
        self.prefix.join(" ")
    }
}

/// Major version from `node -v` output such as `v20.11.1`.
pub fn parse_node_major(output: &str) -> Option<u64> {
    let raw = output.trim();
    if let Ok(version) = Version::parse(raw.trim_start_matches('v')) {
        return Some(version.major);
    }
    NODE_MAJOR_PATTERN
        .captures(raw)
        .and_then(|caps| caps[1].parse().ok())
}

/// First `x.y.z` token in `wrangler --version` output.
pub fn parse_wrangler_version(output: &str) -> Option<Version> {
    VERSION_TOKEN_PATTERN
        .captures_iter(output)
        .find_map(|caps| Version::parse(&caps[1]).ok())
}

/// Require Node.js at or above the configured major version. Returns the reported version.
pub fn check_node(runner: &dyn CommandRunner, work_dir: &Path, defaults: &Defaults) -> Result<String> {
    let min = defaults.toolchain.min_node_major;
    log_status!("deps", "Checking Node.js version...");

    let result = runner
        .run(work_dir, &argv(&["node", "-v"]), defaults.timeouts.node_check())
        .map_err(|e| {
            Error::dependency_missing("node", min.to_string(), e.message)
                .with_hint("Install Node.js from https://nodejs.org and make sure 'node' is in PATH")
        })?;

    if !result.succeeded {
        return Err(Error::dependency_missing(
            "node",
            min.to_string(),
            result.combined_output,
        ));
    }

    let reported = result.combined_output.trim().to_string();
    let required = format!(">= {}", min);
    let major = parse_node_major(&reported).ok_or_else(|| {
        Error::dependency_version_mismatch("node", required.clone(), None, reported.clone())
    })?;

    if major < min {
        return Err(Error::dependency_version_mismatch(
            "node",
            required,
            Some(reported.clone()),
            reported,
        )
        .with_hint("Upgrade Node.js to a current LTS release"));
    }

    log_status!("deps", "Node.js {} is compatible", reported);
    Ok(reported)
}

fn installed_version(
    runner: &dyn CommandRunner,
    work_dir: &Path,
    cli: &WranglerCli,
    timeout: Duration,
) -> (Option<Version>, String) {
    match runner.run(work_dir, &cli.argv(&["--version"]), timeout) {
        Ok(result) if result.succeeded => (
            parse_wrangler_version(&result.combined_output),
            result.combined_output,
        ),
        Ok(result) => (None, result.combined_output),
        Err(err) => (None, err.message),
    }
}

/// Make sure the pinned wrangler release is runnable, installing it through npm if needed.
pub fn ensure_wrangler(
    runner: &dyn CommandRunner,
    work_dir: &Path,
    defaults: &Defaults,
) -> Result<WranglerCli> {
    let required_raw = defaults.toolchain.wrangler_version.as_str();
    let required = Version::parse(required_raw).map_err(|e| {
        Error::config_invalid_value(
            "defaults.toolchain.wranglerVersion",
            Some(required_raw.to_string()),
            e.to_string(),
        )
    })?;

    log_status!("deps", "Checking wrangler version...");
    let cli = WranglerCli::resolve(runner);
    let (found, _) = installed_version(runner, work_dir, &cli, defaults.timeouts.version_check());

    match found {
        Some(version) if version == required => {
            log_status!("deps", "wrangler {} found", version);
            return Ok(cli);
        }
        Some(version) => {
            log_status!("deps", "wrangler {} found, {} required. Reinstalling", version, required)
        }
        None => log_status!("deps", "wrangler not found. Installing {}", required),
    }

    retry(defaults.retry.policy(), "wrangler install", |_| {
        install_wrangler(runner, work_dir, defaults, &required)
    })
}

fn install_wrangler(
    runner: &dyn CommandRunner,
    work_dir: &Path,
    defaults: &Defaults,
    required: &Version,
) -> Result<WranglerCli> {
    let timeout = defaults.timeouts.command();
    let required_str = required.to_string();

    for cleanup in [
        &["npm", "cache", "clean", "--force"][..],
        &["npm", "uninstall", "-g", "wrangler"][..],
    ] {
        match runner.run(work_dir, &argv(cleanup), timeout) {
            Ok(result) if result.succeeded => {}
            Ok(result) => log_status!(
                "deps",
                "Warning: '{}' failed: {}",
                result.command,
                result.error.unwrap_or_default()
            ),
            Err(err) => log_status!("deps", "Warning: {}", err.message),
        }
    }

    let package = format!("wrangler@{}", required_str);
    log_status!("deps", "Installing {} globally...", package);
    let result = runner
        .run(work_dir, &argv(&["npm", "install", "-g", &package]), timeout)
        .map_err(|e| {
            Error::new(
                ErrorCode::DependencyMissing,
                format!("npm is required to install wrangler: {}", e.message),
                e.details,
            )
            .with_hint("Install npm (bundled with Node.js) and make sure it is in PATH")
            .with_retryable(false)
        })?;

    if !result.succeeded {
        return Err(Error::dependency_install_failed(
            "wrangler",
            &required_str,
            result.failure_details(),
        ));
    }

    let cli = WranglerCli::resolve(runner);
    let (found, output) =
        installed_version(runner, work_dir, &cli, defaults.timeouts.version_check());

    match found {
        Some(version) if &version == required => {
            log_status!("deps", "wrangler {} installed", version);
            Ok(cli)
        }
        other => Err(Error::dependency_version_mismatch(
            "wrangler",
            required_str,
            other.map(|v| v.to_string()),
            output,
        )),
    }
}
