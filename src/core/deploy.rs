//! Deploy step: publish the panel with wrangler and derive its URL.

use serde::Serialize;
use std::path::Path;

use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::extract::OutputExtractor;
use crate::mode::DeployMode;
use crate::toolchain::WranglerCli;
use crate::utils::command::{CommandResult, CommandRunner};
use crate::utils::retry::retry;

/// Output fragments of failures that usually clear up on their own.
pub const TRANSIENT_MARKERS: &[&str] = &["timed out", "try again", "503", "rate limit"];

pub const PANEL_PATH: &str = "/panel";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutcome {
    pub panel_url: String,
}

/// Publish the panel, retrying failed attempts up to the budget.
pub fn deploy(
    runner: &dyn CommandRunner,
    cli: &WranglerCli,
    work_dir: &Path,
    extractor: &dyn OutputExtractor,
    mode: DeployMode,
    project_name: &str,
    defaults: &Defaults,
) -> Result<DeploymentOutcome> {
    let policy = defaults.retry.policy();

    retry(policy, "deploy", |attempt| {
        log_status!("deploy", "Deploy attempt {}/{}", attempt, policy.attempts);
        match mode {
            DeployMode::Workers => deploy_worker(runner, cli, work_dir, extractor, defaults),
            DeployMode::Pages => deploy_pages(runner, cli, work_dir, project_name, defaults),
        }
    })
}

fn deploy_worker(
    runner: &dyn CommandRunner,
    cli: &WranglerCli,
    work_dir: &Path,
    extractor: &dyn OutputExtractor,
    defaults: &Defaults,
) -> Result<DeploymentOutcome> {
    let argv = cli.argv(&["deploy", "src/worker.js"]);
    let result = runner.run(work_dir, &argv, defaults.timeouts.deploy())?;

    if !result.succeeded {
        return Err(attempt_failed(result));
    }

    let base = extractor.deployed_url(&result.combined_output).ok_or_else(|| {
        Error::output_parse_failed("workers.dev URL", &result.combined_output)
            .with_hint("The worker may be live anyway. Check the Cloudflare dashboard for its route")
            .with_retryable(false)
    })?;

    Ok(DeploymentOutcome {
        panel_url: format!("{}{}", base, PANEL_PATH),
    })
}

fn deploy_pages(
    runner: &dyn CommandRunner,
    cli: &WranglerCli,
    work_dir: &Path,
    project_name: &str,
    defaults: &Defaults,
) -> Result<DeploymentOutcome> {
    let timeout = defaults.timeouts.deploy();

    log_status!("deploy", "Creating Pages project '{}'...", project_name);
    let create = cli.argv(&[
        "pages",
        "project",
        "create",
        project_name,
        "--production-branch",
        "main",
    ]);
    match runner.run(work_dir, &create, timeout) {
        Ok(result) if result.succeeded => {
            log_status!("deploy", "Pages project '{}' created", project_name)
        }
        Ok(result) if result.mentions_any(&["already exists"]) => {
            log_status!("deploy", "Pages project '{}' already exists", project_name)
        }
        Ok(result) => log_status!(
            "deploy",
            "Warning: creating Pages project failed: {}. Proceeding to deploy",
            result.error.unwrap_or_default()
        ),
        Err(err) => log_status!(
            "deploy",
            "Warning: creating Pages project failed: {}. Proceeding to deploy",
            err.message
        ),
    }

    log_status!("deploy", "Deploying to Pages project '{}'...", project_name);
    let publish = cli.argv(&[
        "pages",
        "deploy",
        "src",
        "--project-name",
        project_name,
        "--branch",
        "main",
        "--commit-dirty=true",
    ]);
    let result = runner.run(work_dir, &publish, timeout)?;

    if !result.succeeded {
        return Err(attempt_failed(result));
    }

    Ok(DeploymentOutcome {
        panel_url: format!("https://{}.pages.dev{}", project_name, PANEL_PATH),
    })
}

fn attempt_failed(result: CommandResult) -> Error {
    let transient = result.mentions_any(TRANSIENT_MARKERS);
    if transient {
        log_status!("deploy", "Deployment hit a transient error");
    } else {
        log_status!("deploy", "Deployment failed with an unrecognized error");
    }

    let reason = result
        .error
        .clone()
        .unwrap_or_else(|| "failed".to_string());
    Error::deploy_failed(
        format!("'{}' failed: {}", result.command, reason),
        result.failure_details(),
    )
    .with_retryable(true)
}
