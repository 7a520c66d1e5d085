//! Per-run panel credentials and a project name that is free on the account.

use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::defaults::PanelConfig;
use crate::error::{Error, Result};
use crate::mode::DeployMode;
use crate::toolchain::WranglerCli;
use crate::utils::command::CommandRunner;
use crate::utils::random::{random_string, PositionRule, ALNUM, LOWER_ALNUM, PASSWORD};

pub const PROJECT_NAME_LEN: usize = 20;
pub const AUTH_TOKEN_LEN: usize = 16;
pub const SUBSCRIPTION_PATH_LEN: usize = 12;

/// Values generated once per run and baked into the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSecrets {
    pub project_name: String,
    pub instance_id: Uuid,
    /// Trojan password.
    pub auth_token: String,
    pub proxy_host: String,
    pub fallback_host: String,
    pub subscription_path: String,
}

pub fn generate_project_name() -> String {
    random_string(LOWER_ALNUM, PROJECT_NAME_LEN, PositionRule::DomainLabel)
}

pub fn generate_auth_token() -> String {
    random_string(PASSWORD, AUTH_TOKEN_LEN, PositionRule::NoLeadingDigit)
}

pub fn generate_subscription_path() -> String {
    random_string(ALNUM, SUBSCRIPTION_PATH_LEN, PositionRule::NoLeadingDigit)
}

/// Whether a project name is still free on the remote account.
pub trait NameAvailability {
    fn is_available(&self, name: &str) -> Result<bool>;
}

/// Availability check backed by wrangler listings.
pub struct WranglerNameCheck<'a> {
    pub runner: &'a dyn CommandRunner,
    pub cli: &'a WranglerCli,
    pub work_dir: &'a Path,
    pub mode: DeployMode,
    pub timeout: Duration,
}

impl NameAvailability for WranglerNameCheck<'_> {
    fn is_available(&self, name: &str) -> Result<bool> {
        match self.mode {
            DeployMode::Workers => {
                let argv = self.cli.argv(&["deployments", "list", "--name", name]);
                let result = self.runner.run(self.work_dir, &argv, self.timeout)?;
                if result.succeeded {
                    return Ok(false);
                }
                let output = &result.combined_output;
                if output.contains("No deployments found")
                    || output.to_lowercase().contains("not found")
                {
                    return Ok(true);
                }
                Err(Error::command_failed(
                    format!(
                        "Checking worker name availability failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    ),
                    result.failure_details(),
                ))
            }
            DeployMode::Pages => {
                let argv = self.cli.argv(&["pages", "project", "list"]);
                let result = self
                    .runner
                    .run(self.work_dir, &argv, self.timeout)?
                    .require_success("Listing Pages projects")?;
                Ok(!result.combined_output.contains(name))
            }
        }
    }
}

/// Generate every secret, looping on project names until one is available.
///
/// Check errors also trigger a new name. `panel.name_attempt_limit` caps the loop.
pub fn generate_secrets(
    availability: &dyn NameAvailability,
    panel: &PanelConfig,
) -> Result<GeneratedSecrets> {
    let project_name = find_available_name(availability, panel.name_attempt_limit)?;

    let secrets = GeneratedSecrets {
        project_name,
        instance_id: Uuid::new_v4(),
        auth_token: generate_auth_token(),
        proxy_host: panel.proxy_host.clone(),
        fallback_host: panel.fallback_host.clone(),
        subscription_path: generate_subscription_path(),
    };

    log_status!("generate", "UUID: {}", secrets.instance_id);
    log_status!("generate", "Proxy IP: {}", secrets.proxy_host);
    log_status!("generate", "Fallback domain: {}", secrets.fallback_host);

    Ok(secrets)
}

fn find_available_name(availability: &dyn NameAvailability, limit: Option<u32>) -> Result<String> {
    let mut attempts: u32 = 0;

    loop {
        if let Some(limit) = limit {
            if attempts >= limit {
                return Err(Error::panel_name_unavailable(attempts));
            }
        }
        attempts = attempts.saturating_add(1);

        let candidate = generate_project_name();
        log_status!("generate", "Checking availability of '{}'...", candidate);

        match availability.is_available(&candidate) {
            Ok(true) => {
                log_status!("generate", "Project name '{}' is available", candidate);
                return Ok(candidate);
            }
            Ok(false) => {
                log_status!("generate", "'{}' is already taken. Generating a new name", candidate)
            }
            Err(err) => log_status!(
                "generate",
                "Could not check '{}': {}. Generating a new name",
                candidate,
                err.message
            ),
        }
    }
}
