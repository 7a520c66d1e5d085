//! Fixed-delay retry loops.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::utils::command::{CommandResult, CommandRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. Errors flagged `retryable = Some(false)`
/// stop the loop immediately. On exhaustion the last error is returned.
pub fn retry<T>(
    policy: RetryPolicy,
    label: &str,
    mut op: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable == Some(false) => return Err(err),
            Err(err) if attempt >= attempts => {
                log_status!("retry", "{} failed after {} attempts", label, attempts);
                return Err(err);
            }
            Err(err) => {
                log_status!(
                    "retry",
                    "{} attempt {}/{} failed: {}. Retrying in {}s",
                    label,
                    attempt,
                    attempts,
                    err.message,
                    policy.delay.as_secs()
                );
                thread::sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}

/// Run a command until it succeeds, returning the last outcome when every attempt fails.
///
/// Spawn errors are retried like failed results; a spawn error on the final attempt is
/// returned as `Err`.
pub fn run_with_retry(
    runner: &dyn CommandRunner,
    work_dir: &Path,
    argv: &[String],
    timeout: Duration,
    policy: RetryPolicy,
) -> Result<CommandResult> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = runner.run(work_dir, argv, timeout);
        let succeeded = matches!(&outcome, Ok(result) if result.succeeded);

        if succeeded || attempt >= attempts {
            return outcome;
        }

        log_status!(
            "retry",
            "'{}' attempt {}/{} failed. Retrying in {}s",
            argv.join(" "),
            attempt,
            attempts,
            policy.delay.as_secs()
        );
        thread::sleep(policy.delay);
        attempt += 1;
    }
}
