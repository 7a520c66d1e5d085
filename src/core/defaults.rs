use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths;
use crate::utils::io;
use crate::utils::retry::RetryPolicy;

pub const WRANGLER_VERSION: &str = "4.12.0";
pub const ARTIFACT_URL: &str =
    "https://github.com/bia-pain-bache/BPB-Worker-Panel/releases/latest/download/worker.js";

/// Root configuration structure for wizard.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WizardConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via wizard.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub login: LoginConfig,

    #[serde(default)]
    pub toolchain: ToolchainConfig,

    #[serde(default)]
    pub artifact: ArtifactConfig,

    #[serde(default)]
    pub panel: PanelConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,
}

/// Retry budget shared by every retried stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

/// Per-command deadlines, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,

    #[serde(default = "default_deploy_secs")]
    pub deploy_secs: u64,

    #[serde(default = "default_version_check_secs")]
    pub version_check_secs: u64,

    #[serde(default = "default_node_check_secs")]
    pub node_check_secs: u64,

    #[serde(default = "default_telemetry_secs")]
    pub telemetry_secs: u64,

    #[serde(default = "default_whoami_secs")]
    pub whoami_secs: u64,

    #[serde(default = "default_name_check_secs")]
    pub name_check_secs: u64,

    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginConfig {
    #[serde(default = "default_url_timeout_secs")]
    pub url_timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_teardown_grace_secs")]
    pub teardown_grace_secs: u64,

    #[serde(default = "default_authorize_timeout_secs")]
    pub authorize_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainConfig {
    #[serde(default = "default_wrangler_version")]
    pub wrangler_version: String,

    #[serde(default = "default_min_node_major")]
    pub min_node_major: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_url")]
    pub url: String,
}

/// Values baked into the panel manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelConfig {
    #[serde(default = "default_proxy_host")]
    pub proxy_host: String,

    #[serde(default = "default_fallback_host")]
    pub fallback_host: String,

    /// Caps the project-name availability loop. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_attempt_limit: Option<u32>,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_attempts() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    5
}

fn default_command_secs() -> u64 {
    120
}

fn default_deploy_secs() -> u64 {
    240
}

fn default_version_check_secs() -> u64 {
    15
}

fn default_node_check_secs() -> u64 {
    10
}

fn default_telemetry_secs() -> u64 {
    10
}

fn default_whoami_secs() -> u64 {
    20
}

fn default_name_check_secs() -> u64 {
    30
}

fn default_download_secs() -> u64 {
    60
}

fn default_url_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_teardown_grace_secs() -> u64 {
    5
}

fn default_authorize_timeout_secs() -> u64 {
    300
}

fn default_wrangler_version() -> String {
    WRANGLER_VERSION.to_string()
}

fn default_min_node_major() -> u64 {
    18
}

fn default_artifact_url() -> String {
    ARTIFACT_URL.to_string()
}

fn default_proxy_host() -> String {
    "bpb.yousef.isegaro.com".to_string()
}

fn default_fallback_host() -> String {
    "speed.cloudflare.com".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: default_command_secs(),
            deploy_secs: default_deploy_secs(),
            version_check_secs: default_version_check_secs(),
            node_check_secs: default_node_check_secs(),
            telemetry_secs: default_telemetry_secs(),
            whoami_secs: default_whoami_secs(),
            name_check_secs: default_name_check_secs(),
            download_secs: default_download_secs(),
        }
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            url_timeout_secs: default_url_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            teardown_grace_secs: default_teardown_grace_secs(),
            authorize_timeout_secs: default_authorize_timeout_secs(),
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            wrangler_version: default_wrangler_version(),
            min_node_major: default_min_node_major(),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            url: default_artifact_url(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            proxy_host: default_proxy_host(),
            fallback_host: default_fallback_host(),
            name_attempt_limit: None,
        }
    }
}

// =============================================================================
// Duration accessors
// =============================================================================

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.delay_secs))
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn deploy(&self) -> Duration {
        Duration::from_secs(self.deploy_secs)
    }

    pub fn version_check(&self) -> Duration {
        Duration::from_secs(self.version_check_secs)
    }

    pub fn node_check(&self) -> Duration {
        Duration::from_secs(self.node_check_secs)
    }

    pub fn telemetry(&self) -> Duration {
        Duration::from_secs(self.telemetry_secs)
    }

    pub fn whoami(&self) -> Duration {
        Duration::from_secs(self.whoami_secs)
    }

    pub fn name_check(&self) -> Duration {
        Duration::from_secs(self.name_check_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }
}

impl LoginConfig {
    pub fn url_timeout(&self) -> Duration {
        Duration::from_secs(self.url_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_secs(self.teardown_grace_secs)
    }

    pub fn authorize_timeout(&self) -> Duration {
        Duration::from_secs(self.authorize_timeout_secs)
    }
}

impl Defaults {
    /// Reject values that would make a run meaningless before any side effect happens.
    pub fn validate(&self) -> Result<()> {
        if semver::Version::parse(&self.toolchain.wrangler_version).is_err() {
            return Err(Error::config_invalid_value(
                "defaults.toolchain.wranglerVersion",
                Some(self.toolchain.wrangler_version.clone()),
                "Must be an exact semantic version such as 4.12.0",
            ));
        }

        let url = self.artifact.url.as_str();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(Error::config_invalid_value(
                "defaults.artifact.url",
                Some(url.to_string()),
                "Must be an http(s) URL",
            ));
        }

        for (key, host) in [
            ("defaults.panel.proxyHost", &self.panel.proxy_host),
            ("defaults.panel.fallbackHost", &self.panel.fallback_host),
        ] {
            if host.trim().is_empty() {
                return Err(Error::config_invalid_value(
                    key,
                    Some(host.clone()),
                    "Host must not be empty",
                ));
            }
        }

        let t = &self.timeouts;
        let l = &self.login;
        for (key, value) in [
            ("defaults.timeouts.commandSecs", t.command_secs),
            ("defaults.timeouts.deploySecs", t.deploy_secs),
            ("defaults.timeouts.versionCheckSecs", t.version_check_secs),
            ("defaults.timeouts.nodeCheckSecs", t.node_check_secs),
            ("defaults.timeouts.telemetrySecs", t.telemetry_secs),
            ("defaults.timeouts.whoamiSecs", t.whoami_secs),
            ("defaults.timeouts.nameCheckSecs", t.name_check_secs),
            ("defaults.timeouts.downloadSecs", t.download_secs),
            ("defaults.login.urlTimeoutSecs", l.url_timeout_secs),
            ("defaults.login.pollIntervalMs", l.poll_interval_ms),
            ("defaults.login.teardownGraceSecs", l.teardown_grace_secs),
            ("defaults.login.authorizeTimeoutSecs", l.authorize_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::config_invalid_value(
                    key,
                    Some("0".to_string()),
                    "Must be greater than zero",
                ));
            }
        }

        if self.panel.name_attempt_limit == Some(0) {
            return Err(Error::config_invalid_value(
                "defaults.panel.nameAttemptLimit",
                Some("0".to_string()),
                "Must be at least 1 when set",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging wizard.json with built-in defaults.
/// A missing or invalid wizard.json yields built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

pub fn load_config() -> WizardConfig {
    let path = match paths::wizard_json() {
        Ok(path) => path,
        Err(_) => return WizardConfig::default(),
    };

    if !path.exists() {
        return WizardConfig::default();
    }

    match load_config_from(&path) {
        Ok(config) => config,
        Err(err) => {
            log_status!(
                "config",
                "Ignoring {}: {}. Using built-in defaults",
                path.display(),
                err.message
            );
            WizardConfig::default()
        }
    }
}

/// Parse a wizard.json file.
pub fn load_config_from(path: &Path) -> Result<WizardConfig> {
    let content = io::read_file(path, &format!("read {}", path.display()))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}
