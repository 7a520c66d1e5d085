//! Interactive `wrangler login` with authorization-URL scraping.
//!
//! The login subprocess prints an OAuth URL and then blocks until the user approves
//! access in the browser. Its output is captured into a live buffer which is polled
//! for the URL while racing `url_timeout`; once found, the browser is opened and the
//! process is awaited (bounded by `authorize_timeout`) before the session is verified
//! with `wrangler whoami`.

use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::browser::BrowserOpener;
use crate::defaults::Defaults;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::extract::OutputExtractor;
use crate::toolchain::WranglerCli;
use crate::utils::command::{display_command, CommandRunner, ProcessExit, RunningCommand};
use crate::utils::retry::retry;
use crate::utils::wait::poll_until;

const TEARDOWN_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    NotStarted,
    WaitingForUrl,
    BrowserOpened,
    WaitingForProcessExit,
    Verifying,
    Success,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReport {
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    pub browser_opened: bool,
    pub telemetry_disabled: bool,
}

enum UrlWait {
    Found(String),
    Exited(ProcessExit),
    WaitFailed(Error),
}

pub struct LoginFlow<'a> {
    runner: &'a dyn CommandRunner,
    browser: &'a dyn BrowserOpener,
    extractor: &'a dyn OutputExtractor,
    cli: &'a WranglerCli,
    work_dir: &'a Path,
    defaults: &'a Defaults,
    state: LoginState,
    history: Vec<LoginState>,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        browser: &'a dyn BrowserOpener,
        extractor: &'a dyn OutputExtractor,
        cli: &'a WranglerCli,
        work_dir: &'a Path,
        defaults: &'a Defaults,
    ) -> Self {
        Self {
            runner,
            browser,
            extractor,
            cli,
            work_dir,
            defaults,
            state: LoginState::NotStarted,
            history: vec![LoginState::NotStarted],
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[LoginState] {
        &self.history
    }

    fn transition(&mut self, next: LoginState) {
        if next == self.state {
            return;
        }
        log_status!("login", "{:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Run the login flow under the retry budget, then disable telemetry.
    pub fn run(&mut self) -> Result<LoginReport> {
        let policy = self.defaults.retry.policy();
        let mut report = LoginReport::default();

        let outcome = retry(policy, "Cloudflare login", |attempt| {
            report.attempts = attempt;
            log_status!("login", "Starting Cloudflare login (attempt {}/{})", attempt, policy.attempts);
            let result = self.attempt(&mut report);
            if result.is_err() {
                self.transition(LoginState::Failed);
            }
            result
        });

        if let Err(last) = outcome {
            return Err(Error::login_failed(
                format!("Cloudflare login failed after {} attempts", report.attempts),
                Some(&last),
            ));
        }

        self.transition(LoginState::Success);
        report.telemetry_disabled = self.disable_telemetry();
        Ok(report)
    }

    fn attempt(&mut self, report: &mut LoginReport) -> Result<()> {
        self.transition(LoginState::NotStarted);
        let defaults = self.defaults;
        let login = &defaults.login;
        let argv = self.cli.argv(&["login"]);
        let command = display_command(&argv);

        let mut process = self.runner.spawn(self.work_dir, &argv)?;
        self.transition(LoginState::WaitingForUrl);
        log_status!(
            "login",
            "Waiting for authorization URL ({}s)",
            login.url_timeout().as_secs()
        );

        let extractor = self.extractor;
        let observed = poll_until(login.poll_interval(), login.url_timeout(), || {
            if let Some(url) = extractor.authorization_url(&process.output()) {
                return Some(UrlWait::Found(url));
            }
            match process.try_wait() {
                Ok(Some(exit)) => Some(UrlWait::Exited(exit)),
                Ok(None) => None,
                Err(err) => Some(UrlWait::WaitFailed(err)),
            }
        });

        match observed {
            None => {
                self.teardown(process.as_mut());
                return Err(Error::command_failed(
                    format!(
                        "No authorization URL from '{}' within {}s",
                        command,
                        login.url_timeout().as_secs()
                    ),
                    CommandFailedDetails {
                        command,
                        timed_out: true,
                        output: process.output(),
                        ..Default::default()
                    },
                ));
            }
            Some(UrlWait::WaitFailed(err)) => {
                self.teardown(process.as_mut());
                return Err(err);
            }
            Some(UrlWait::Exited(exit)) if exit.success => {
                log_status!("login", "Login exited before printing a URL. Checking existing session");
            }
            Some(UrlWait::Exited(exit)) => {
                return Err(exit_error(&command, exit, process.output()));
            }
            Some(UrlWait::Found(url)) => {
                report.authorization_url = Some(url.clone());
                self.open_browser(&url, report);
                self.await_authorization(process.as_mut(), &command)?;
            }
        }

        self.verify()
    }

    fn open_browser(&mut self, url: &str, report: &mut LoginReport) {
        self.transition(LoginState::BrowserOpened);
        match self.browser.open(url) {
            Ok(()) => {
                report.browser_opened = true;
                log_status!("login", "Browser opened. Authorize access in the browser");
            }
            Err(err) => {
                report.browser_opened = false;
                // The login cannot finish without this URL, so it bypasses the TTY gate.
                eprintln!("{}", manual_login_notice(url, &err));
            }
        }
    }

    fn await_authorization(&mut self, process: &mut dyn RunningCommand, command: &str) -> Result<()> {
        self.transition(LoginState::WaitingForProcessExit);
        let defaults = self.defaults;
        let login = &defaults.login;

        let waited = poll_until(login.poll_interval(), login.authorize_timeout(), || {
            match process.try_wait() {
                Ok(Some(exit)) => Some(Ok(exit)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        });

        match waited {
            Some(Ok(exit)) if exit.success => Ok(()),
            Some(Ok(exit)) => Err(exit_error(command, exit, process.output())),
            Some(Err(err)) => {
                self.teardown(process);
                Err(err)
            }
            None => {
                self.teardown(process);
                Err(Error::command_failed(
                    format!(
                        "Authorization was not completed within {}s",
                        login.authorize_timeout().as_secs()
                    ),
                    CommandFailedDetails {
                        command: command.to_string(),
                        timed_out: true,
                        output: process.output(),
                        ..Default::default()
                    },
                ))
            }
        }
    }

    fn verify(&mut self) -> Result<()> {
        self.transition(LoginState::Verifying);
        log_status!("login", "Verifying login status...");

        self.runner
            .run(
                self.work_dir,
                &self.cli.argv(&["whoami"]),
                self.defaults.timeouts.whoami(),
            )?
            .require_success("Login verification")?;

        log_status!("login", "Login verified");
        Ok(())
    }

    /// Kill the process and give it `teardown_grace` to be reaped.
    fn teardown(&self, process: &mut dyn RunningCommand) {
        process.kill();
        let _ = poll_until(TEARDOWN_TICK, self.defaults.login.teardown_grace(), || {
            process.try_wait().ok().flatten()
        });
    }

    fn disable_telemetry(&self) -> bool {
        let argv = self.cli.argv(&["telemetry", "disable"]);
        match self
            .runner
            .run(self.work_dir, &argv, self.defaults.timeouts.telemetry())
        {
            Ok(result) if result.succeeded => true,
            Ok(result) => {
                log_status!(
                    "login",
                    "Warning: could not disable wrangler telemetry: {}",
                    result.error.unwrap_or_default()
                );
                false
            }
            Err(err) => {
                log_status!("login", "Warning: could not disable wrangler telemetry: {}", err.message);
                false
            }
        }
    }
}

/// Message shown when the browser could not be opened for the user.
pub fn manual_login_notice(url: &str, err: &Error) -> String {
    format!(
        "[login] Could not open a browser ({}). Open this URL manually to authorize wrangler:\n{}",
        err.message, url
    )
}

fn exit_error(command: &str, exit: ProcessExit, output: String) -> Error {
    let status = exit
        .code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    Error::command_failed(
        format!("'{}' exited with status {}", command, status),
        CommandFailedDetails {
            command: command.to_string(),
            exit_code: exit.code,
            timed_out: false,
            error: Some(format!("exited with status {}", status)),
            output,
        },
    )
}
