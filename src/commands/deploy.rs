use clap::Args;
use serde::Serialize;

use bpb_wizard::browser::SystemBrowser;
use bpb_wizard::defaults;
use bpb_wizard::download::HttpFetcher;
use bpb_wizard::extract::WranglerExtractor;
use bpb_wizard::paths;
use bpb_wizard::pipeline::{self, Collaborators, PipelineConfig, PipelineReport};
use bpb_wizard::utils::command::SystemRunner;
use bpb_wizard::DeployMode;

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Deployment type: 1 or workers (Cloudflare Workers), 2 or pages (Cloudflare Pages)
    #[arg(long = "deploy", value_name = "TYPE", default_value = "1")]
    pub deploy: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    pub command: String,
    pub panel_url: String,
    pub report: PipelineReport,
}

pub fn run(args: DeployArgs) -> bpb_wizard::Result<DeployOutput> {
    // Mode errors must surface before anything touches the disk or network
    let mode = DeployMode::parse(&args.deploy)?;

    let defaults = defaults::load_defaults();
    defaults.validate()?;

    let install_dir = paths::resolve_install_dir(defaults.install_dir.as_deref())?;
    let config = PipelineConfig::new(mode, install_dir);

    crate::tty::status(&format!(
        "Deploying BPB panel with {} into {}",
        mode.display_name(),
        config.install_dir.display()
    ));
    if !crate::tty::is_stdin_tty() {
        crate::tty::status(
            "Warning: stdin is not a terminal. Wrangler login may not be able to prompt for input",
        );
    }

    let runner = SystemRunner;
    let fetcher = HttpFetcher::new(defaults.timeouts.download())?;
    let browser = SystemBrowser;
    let extractor = WranglerExtractor;

    let report = pipeline::run(
        &config,
        &defaults,
        Collaborators {
            runner: &runner,
            fetcher: &fetcher,
            browser: &browser,
            extractor: &extractor,
        },
    )?;

    for line in summary_lines(&report) {
        crate::tty::status(&line);
    }

    Ok(DeployOutput {
        command: "deploy".to_string(),
        panel_url: report.outcome.panel_url.clone(),
        report,
    })
}

/// Closing summary: where the panel lives and the credentials needed to configure it.
fn summary_lines(report: &PipelineReport) -> Vec<String> {
    let secrets = &report.secrets;
    let mut lines = vec!["BPB panel deployed successfully!".to_string()];
    if report.mode == DeployMode::Pages {
        lines.push(
            "Note: it might take a few minutes for the Pages deployment to become fully active"
                .to_string(),
        );
    }
    lines.push(format!("Access your panel at: {}", report.outcome.panel_url));
    lines.push(format!("Trojan password: {}", secrets.auth_token));
    lines.push(format!("UUID: {}", secrets.instance_id));
    lines.push(format!("Subscription path: {}", secrets.subscription_path));
    lines.extend(report.warnings.iter().map(|w| format!("  note: {}", w)));
    lines
}
