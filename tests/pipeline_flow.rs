//! End-to-end pipeline runs against scripted wrangler, HTTP and browser fakes.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use bpb_wizard::browser::BrowserOpener;
use bpb_wizard::defaults::{builtin_defaults, Defaults, WRANGLER_VERSION};
use bpb_wizard::download::ArtifactFetcher;
use bpb_wizard::extract::WranglerExtractor;
use bpb_wizard::pipeline::{self, Collaborators, PipelineConfig, PipelineReport};
use bpb_wizard::utils::command::{
    display_command, CommandResult, CommandRunner, ProcessExit, RunningCommand,
};
use bpb_wizard::{DeployMode, ErrorCode, Result};
use tempfile::TempDir;

const AUTH_URL: &str =
    "https://dash.cloudflare.com/oauth2/auth?response_type=code&client_id=54d11594&state=xyz";

/// Answers each command with the first rule whose pattern it contains.
struct FakeWrangler {
    rules: Vec<(&'static str, CommandResult)>,
    calls: RefCell<Vec<String>>,
}

impl FakeWrangler {
    fn new(rules: Vec<(&'static str, CommandResult)>) -> Self {
        Self {
            rules,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.contains(pattern))
            .cloned()
            .collect()
    }
}

impl CommandRunner for FakeWrangler {
    fn run(&self, _work_dir: &Path, argv: &[String], _timeout: Duration) -> Result<CommandResult> {
        let command = display_command(argv);
        self.calls.borrow_mut().push(command.clone());

        let result = self
            .rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| CommandResult::success(command.as_str(), ""));
        Ok(CommandResult { command, ..result })
    }

    fn spawn(&self, _work_dir: &Path, argv: &[String]) -> Result<Box<dyn RunningCommand>> {
        self.calls.borrow_mut().push(display_command(argv));
        Ok(Box::new(LoginProcess))
    }

    fn locate(&self, _program: &str) -> Option<PathBuf> {
        None
    }
}

/// `wrangler login` that prints the OAuth URL and exits once authorized.
struct LoginProcess;

impl RunningCommand for LoginProcess {
    fn output(&self) -> String {
        format!("Attempting to login via OAuth...\nOpening a link in your default browser: {}\n", AUTH_URL)
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        Ok(Some(ProcessExit {
            success: true,
            code: Some(0),
        }))
    }

    fn kill(&mut self) {}
}

struct StaticFetcher;

impl ArtifactFetcher for StaticFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> Result<u64> {
        let body = b"export default { fetch() { return new Response('ok') } }";
        std::fs::write(dest, body).unwrap();
        Ok(body.len() as u64)
    }
}

#[derive(Default)]
struct RecordingBrowser {
    opened: RefCell<Vec<String>>,
}

impl BrowserOpener for RecordingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.borrow_mut().push(url.to_string());
        Ok(())
    }
}

fn fast_defaults() -> Defaults {
    let mut defaults = builtin_defaults();
    defaults.retry.delay_secs = 0;
    defaults.login.poll_interval_ms = 1;
    defaults
}

fn common_rules() -> Vec<(&'static str, CommandResult)> {
    vec![
        ("node -v", CommandResult::success("", "v20.11.1\n")),
        (
            "wrangler --version",
            CommandResult::success("", format!(" ⛅️ wrangler {}\n", WRANGLER_VERSION)),
        ),
        ("wrangler whoami", CommandResult::success("", "You are logged in with an OAuth Token")),
        (
            "kv namespace create",
            CommandResult::success(
                "",
                "✨ Success!\n{\n  \"binding\": \"bpb\",\n  \"id\": \"deadbeefdeadbeefdeadbeefdeadbeef\"\n}\n",
            ),
        ),
    ]
}

fn run_pipeline(
    runner: &FakeWrangler,
    browser: &RecordingBrowser,
    config: &PipelineConfig,
) -> Result<PipelineReport> {
    pipeline::run(
        config,
        &fast_defaults(),
        Collaborators {
            runner,
            fetcher: &StaticFetcher,
            browser,
            extractor: &WranglerExtractor,
        },
    )
}

#[test]
fn workers_run_deploys_panel_and_writes_manifest() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("wrangler.json"), "{}").unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/stale.js"), "old").unwrap();

    let mut rules = common_rules();
    rules.push((
        "deployments list",
        CommandResult::failure("", "No deployments found", Some(1), "exited with status 1"),
    ));
    rules.push((
        "wrangler deploy",
        CommandResult::success("", "Uploaded panel (1.2 sec)\n  https://foo.workers.dev\n"),
    ));
    let runner = FakeWrangler::new(rules);
    let browser = RecordingBrowser::default();
    let config = PipelineConfig::new(DeployMode::Workers, dir.path());

    let report = run_pipeline(&runner, &browser, &config).unwrap();

    assert_eq!(report.outcome.panel_url, "https://foo.workers.dev/panel");
    assert_eq!(report.namespace.namespace_id, "deadbeefdeadbeefdeadbeefdeadbeef");
    assert_eq!(report.wrangler, "npx wrangler");
    assert!(report.login.browser_opened);
    assert_eq!(browser.opened.borrow().as_slice(), &[AUTH_URL.to_string()]);

    assert!(!dir.path().join("wrangler.json").exists());
    assert!(!dir.path().join("src/stale.js").exists());
    assert!(dir.path().join("src/worker.js").exists());

    let manifest: toml::Table =
        toml::from_str(&std::fs::read_to_string(dir.path().join("wrangler.toml")).unwrap())
            .unwrap();
    assert_eq!(manifest["name"].as_str(), Some(report.secrets.project_name.as_str()));
    assert_eq!(manifest["main"].as_str(), Some("src/worker.js"));
    assert_eq!(
        manifest["kv_namespaces"][0]["id"].as_str(),
        Some("deadbeefdeadbeefdeadbeefdeadbeef")
    );

    let stages: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(
        stages,
        vec![
            "cleanup",
            "setup",
            "dependencies",
            "login",
            "generate",
            "download",
            "namespace",
            "manifest",
            "deploy"
        ]
    );
    assert_eq!(runner.calls_matching("deploy src/worker.js").len(), 1);
}

#[test]
fn pages_run_derives_url_from_project_name() {
    let dir = TempDir::new().unwrap();

    let mut rules = common_rules();
    rules.push(("pages project list", CommandResult::success("", "┌──────┐\n└──────┘\n")));
    rules.push((
        "pages deploy",
        CommandResult::success("", "✨ Deployment complete! https://8f3e1a.other.pages.dev"),
    ));
    let runner = FakeWrangler::new(rules);
    let browser = RecordingBrowser::default();
    let config = PipelineConfig::new(DeployMode::Pages, dir.path());

    let report = run_pipeline(&runner, &browser, &config).unwrap();

    let deploys = runner.calls_matching("pages deploy");
    assert_eq!(deploys.len(), 1);
    let name = deploys[0]
        .split_whitespace()
        .skip_while(|arg| *arg != "--project-name")
        .nth(1)
        .unwrap()
        .to_string();

    assert_eq!(name, report.secrets.project_name);
    assert_eq!(report.outcome.panel_url, format!("https://{}.pages.dev/panel", name));
    assert!(dir.path().join("src/_worker.js").exists());

    let manifest = std::fs::read_to_string(dir.path().join("wrangler.toml")).unwrap();
    assert!(manifest.contains("pages_build_output_dir = \"src\""));
    assert!(!manifest.contains("workers_dev"));
}

#[test]
fn failing_stage_is_named_in_error_details() {
    let dir = TempDir::new().unwrap();

    let mut rules = common_rules();
    rules.insert(
        0,
        (
            "kv namespace create",
            CommandResult::failure("", "fetch failed", Some(1), "exited with status 1"),
        ),
    );
    rules.push((
        "deployments list",
        CommandResult::failure("", "No deployments found", Some(1), "exited with status 1"),
    ));
    let runner = FakeWrangler::new(rules);
    let browser = RecordingBrowser::default();
    let config = PipelineConfig::new(DeployMode::Workers, dir.path());

    let err = run_pipeline(&runner, &browser, &config).unwrap_err();

    assert_eq!(err.code, ErrorCode::NamespaceCreateFailed);
    assert_eq!(err.details["stage"], "namespace");
    assert_eq!(runner.calls_matching("kv namespace create").len(), 3);
    assert!(runner.calls_matching("deploy src/worker.js").is_empty());
    assert!(!dir.path().join("wrangler.toml").exists());
}

#[test]
fn outdated_node_stops_before_login() {
    let dir = TempDir::new().unwrap();

    let mut rules = common_rules();
    rules.insert(0, ("node -v", CommandResult::success("", "v16.20.2\n")));
    let runner = FakeWrangler::new(rules);
    let browser = RecordingBrowser::default();
    let config = PipelineConfig::new(DeployMode::Workers, dir.path());

    let err = run_pipeline(&runner, &browser, &config).unwrap_err();

    assert_eq!(err.details["stage"], "dependencies");
    assert!(runner.calls_matching("wrangler login").is_empty());
    assert!(browser.opened.borrow().is_empty());
}

#[test]
fn invalid_deploy_type_exits_with_validation_code() {
    let home = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_bpb-wizard"))
        .args(["--deploy", "3"])
        .env("HOME", home.path())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["code"], "validation.invalid_argument");
    assert!(!home.path().join(".bpb-terminal-wizard").exists());
}
