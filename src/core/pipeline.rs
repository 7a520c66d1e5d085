//! Staged provisioning run: prerequisites, login, secrets, artifact, namespace,
//! manifest and deploy, in that order.
//!
//! Each stage either completes or aborts the run with an error tagged with the
//! stage name. Retry budgets live inside the stages; best-effort work only adds
//! warnings to the report.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::browser::BrowserOpener;
use crate::defaults::Defaults;
use crate::deploy::{self, DeploymentOutcome};
use crate::download::{self, ArtifactFetcher};
use crate::error::{Error, Result};
use crate::extract::OutputExtractor;
use crate::login::{LoginFlow, LoginReport};
use crate::manifest;
use crate::mode::DeployMode;
use crate::namespace::{self, ProvisionedResource};
use crate::paths;
use crate::secrets::{self, GeneratedSecrets, WranglerNameCheck};
use crate::toolchain::{self, WranglerCli};
use crate::utils::command::CommandRunner;
use crate::utils::io;

/// Where a run writes its files. Fixed for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub mode: DeployMode,
    pub install_dir: PathBuf,
    pub source_dir: PathBuf,
    pub manifest_path: PathBuf,
}

impl PipelineConfig {
    pub fn new(mode: DeployMode, install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        Self {
            mode,
            source_dir: paths::source_dir(&install_dir),
            manifest_path: paths::manifest(&install_dir),
            install_dir,
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.source_dir.join(self.mode.artifact_file_name())
    }

    pub fn legacy_manifest_path(&self) -> PathBuf {
        paths::legacy_manifest(&self.install_dir)
    }
}

/// External systems the pipeline talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a dyn ArtifactFetcher,
    pub browser: &'a dyn BrowserOpener,
    pub extractor: &'a dyn OutputExtractor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cleanup,
    Setup,
    Dependencies,
    Login,
    Generate,
    Download,
    Namespace,
    Manifest,
    Deploy,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Cleanup => "cleanup",
            Stage::Setup => "setup",
            Stage::Dependencies => "dependencies",
            Stage::Login => "login",
            Stage::Generate => "generate",
            Stage::Download => "download",
            Stage::Namespace => "namespace",
            Stage::Manifest => "manifest",
            Stage::Deploy => "deploy",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage: Stage,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub outcome: DeploymentOutcome,
    pub mode: DeployMode,
    pub install_dir: String,
    pub manifest_path: String,
    pub node_version: String,
    pub wrangler: String,
    pub login: LoginReport,
    pub secrets: GeneratedSecrets,
    pub namespace: ProvisionedResource,
    pub stages: Vec<StageResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// State threaded through the stages of one run.
struct RunContext<'a> {
    config: &'a PipelineConfig,
    defaults: &'a Defaults,
    deps: Collaborators<'a>,
    stages: Vec<StageResult>,
    warnings: Vec<String>,
}

impl<'a> RunContext<'a> {
    fn work_dir(&self) -> &'a Path {
        &self.config.install_dir
    }

    fn warn(&mut self, message: String) {
        log_status!("pipeline", "Warning: {}", message);
        self.warnings.push(message);
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        op: impl FnOnce(&mut Self) -> Result<(T, Option<Value>)>,
    ) -> Result<T> {
        log_status!("pipeline", "==> {}", stage.as_str());
        let started = Instant::now();

        match op(self) {
            Ok((value, data)) => {
                self.stages.push(StageResult {
                    stage,
                    duration_ms: started.elapsed().as_millis() as u64,
                    data,
                });
                Ok(value)
            }
            Err(err) => {
                log_status!("pipeline", "Stage '{}' failed: {}", stage.as_str(), err.message);
                Err(tag_stage(err, stage))
            }
        }
    }

    fn cleanup(&mut self) -> Result<((), Option<Value>)> {
        let targets = [
            self.config.legacy_manifest_path(),
            self.config.manifest_path.clone(),
            self.config.source_dir.clone(),
        ];

        let mut removed = Vec::new();
        for target in targets {
            match io::remove_path(&target, &format!("remove {}", target.display())) {
                Ok(true) => removed.push(target.display().to_string()),
                Ok(false) => {}
                Err(err) => self.warn(format!(
                    "Could not remove {}: {}",
                    target.display(),
                    err.details["error"].as_str().unwrap_or(&err.message)
                )),
            }
        }

        Ok(((), Some(serde_json::json!({ "removed": removed }))))
    }

    fn setup(&mut self) -> Result<((), Option<Value>)> {
        io::ensure_dir(&self.config.install_dir, "create install directory")?;
        io::ensure_dir(&self.config.source_dir, "create source directory")?;
        Ok(((), None))
    }

    fn dependencies(&mut self) -> Result<((String, WranglerCli), Option<Value>)> {
        let node = toolchain::check_node(self.deps.runner, self.work_dir(), self.defaults)?;
        let cli = toolchain::ensure_wrangler(self.deps.runner, self.work_dir(), self.defaults)?;
        let data = serde_json::json!({ "node": node, "wrangler": cli.display() });
        Ok(((node, cli), Some(data)))
    }

    fn login(&mut self, cli: &WranglerCli) -> Result<(LoginReport, Option<Value>)> {
        let mut flow = LoginFlow::new(
            self.deps.runner,
            self.deps.browser,
            self.deps.extractor,
            cli,
            self.work_dir(),
            self.defaults,
        );
        let report = flow.run()?;

        if !report.browser_opened {
            if let Some(url) = &report.authorization_url {
                self.warn(format!("Browser could not be opened; login URL was {}", url));
            }
        }
        if !report.telemetry_disabled {
            self.warn("Could not disable wrangler telemetry".to_string());
        }
        Ok((report, None))
    }

    fn generate(&mut self, cli: &WranglerCli) -> Result<(GeneratedSecrets, Option<Value>)> {
        let mode = self.config.mode;
        log_status!("generate", "Selected deployment type: {}", mode.display_name());
        if mode == DeployMode::Pages {
            log_status!(
                "generate",
                "Note: settings of a Pages deployment are harder to change later from the dashboard"
            );
        }

        let check = WranglerNameCheck {
            runner: self.deps.runner,
            cli,
            work_dir: self.work_dir(),
            mode,
            timeout: self.defaults.timeouts.name_check(),
        };
        let secrets = secrets::generate_secrets(&check, &self.defaults.panel)?;
        let data = serde_json::json!({ "projectName": secrets.project_name });
        Ok((secrets, Some(data)))
    }

    fn download(&mut self) -> Result<((), Option<Value>)> {
        let dest = self.config.artifact_path();
        let bytes = download::download_artifact(
            self.deps.fetcher,
            &self.defaults.artifact.url,
            &dest,
            self.defaults.retry.policy(),
        )?;
        let data = serde_json::json!({ "path": dest.display().to_string(), "bytes": bytes });
        Ok(((), Some(data)))
    }

    fn namespace(&mut self, cli: &WranglerCli) -> Result<(ProvisionedResource, Option<Value>)> {
        self.warn(
            "KV namespaces created by previous runs are not deleted. Remove unused ones from the Cloudflare dashboard"
                .to_string(),
        );
        let resource = namespace::create_namespace(
            self.deps.runner,
            cli,
            self.work_dir(),
            self.deps.extractor,
            self.defaults,
        )?;
        Ok((resource, None))
    }

    fn manifest(
        &mut self,
        secrets: &GeneratedSecrets,
        resource: &ProvisionedResource,
    ) -> Result<((), Option<Value>)> {
        let today = chrono::Local::now().date_naive();
        let built = manifest::build(secrets, resource, self.config.mode, today);
        let content = manifest::write(&self.config.manifest_path, &built)?;
        log_status!("manifest", "Generated wrangler.toml:\n{}", content);
        Ok(((), Some(serde_json::json!({ "compatibilityDate": built.compatibility_date }))))
    }

    fn deploy(
        &mut self,
        cli: &WranglerCli,
        secrets: &GeneratedSecrets,
    ) -> Result<(DeploymentOutcome, Option<Value>)> {
        let outcome = deploy::deploy(
            self.deps.runner,
            cli,
            self.work_dir(),
            self.deps.extractor,
            self.config.mode,
            &secrets.project_name,
            self.defaults,
        )?;
        Ok((outcome, None))
    }
}

fn tag_stage(mut err: Error, stage: Stage) -> Error {
    match &mut err.details {
        Value::Object(map) => {
            map.insert("stage".to_string(), Value::String(stage.as_str().to_string()));
        }
        other => {
            let inner = std::mem::take(other);
            err.details = serde_json::json!({ "stage": stage.as_str(), "details": inner });
        }
    }
    err
}

/// Run every stage in order and report the deployed panel.
pub fn run(
    config: &PipelineConfig,
    defaults: &Defaults,
    deps: Collaborators<'_>,
) -> Result<PipelineReport> {
    let mut ctx = RunContext {
        config,
        defaults,
        deps,
        stages: Vec::new(),
        warnings: Vec::new(),
    };

    ctx.stage(Stage::Cleanup, |ctx| ctx.cleanup())?;
    ctx.stage(Stage::Setup, |ctx| ctx.setup())?;
    let (node_version, cli) = ctx.stage(Stage::Dependencies, |ctx| ctx.dependencies())?;
    let login = ctx.stage(Stage::Login, |ctx| ctx.login(&cli))?;
    let secrets = ctx.stage(Stage::Generate, |ctx| ctx.generate(&cli))?;
    ctx.stage(Stage::Download, |ctx| ctx.download())?;
    let namespace = ctx.stage(Stage::Namespace, |ctx| ctx.namespace(&cli))?;
    ctx.stage(Stage::Manifest, |ctx| ctx.manifest(&secrets, &namespace))?;
    let outcome = ctx.stage(Stage::Deploy, |ctx| ctx.deploy(&cli, &secrets))?;

    log_status!("pipeline", "Panel deployed: {}", outcome.panel_url);

    Ok(PipelineReport {
        outcome,
        mode: config.mode,
        install_dir: config.install_dir.display().to_string(),
        manifest_path: config.manifest_path.display().to_string(),
        node_version,
        wrangler: cli.display(),
        login,
        secrets,
        namespace,
        stages: ctx.stages,
        warnings: ctx.warnings,
    })
}
