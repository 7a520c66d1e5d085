//! Scripted collaborators for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::browser::BrowserOpener;
use crate::error::{Error, Result};
use crate::utils::command::{
    display_command, CommandResult, CommandRunner, ProcessExit, RunningCommand,
};

struct Rule {
    pattern: String,
    responses: VecDeque<Result<CommandResult>>,
}

/// Answers commands by substring match on the command line.
///
/// Each rule replays its responses in order and repeats the last one. Commands without
/// a rule succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<String>>,
    processes: RefCell<VecDeque<FakeProcess>>,
    on_path: Vec<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, output: &str) -> Self {
        self.on_seq(pattern, vec![Ok(CommandResult::success(pattern, output))])
    }

    pub fn on_fail(self, pattern: &str, output: &str) -> Self {
        self.on_seq(
            pattern,
            vec![Ok(CommandResult::failure(pattern, output, Some(1), "exited with status 1"))],
        )
    }

    pub fn on_seq(self, pattern: &str, responses: Vec<Result<CommandResult>>) -> Self {
        self.rules.borrow_mut().push(Rule {
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
        self
    }

    pub fn with_path(mut self, program: &str) -> Self {
        self.on_path.push(program.to_string());
        self
    }

    pub fn with_process(self, process: FakeProcess) -> Self {
        self.processes.borrow_mut().push_back(process);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.contains(pattern)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, _work_dir: &Path, argv: &[String], _timeout: Duration) -> Result<CommandResult> {
        let command = display_command(argv);
        self.calls.borrow_mut().push(command.clone());

        let mut rules = self.rules.borrow_mut();
        let rule = match rules.iter_mut().find(|r| command.contains(&r.pattern)) {
            Some(rule) => rule,
            None => return Ok(CommandResult::success(command, "")),
        };

        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        };

        match response {
            Some(Ok(mut result)) => {
                result.command = command;
                Ok(result)
            }
            Some(Err(err)) => Err(err),
            None => Ok(CommandResult::success(command, "")),
        }
    }

    fn spawn(&self, _work_dir: &Path, argv: &[String]) -> Result<Box<dyn RunningCommand>> {
        let command = display_command(argv);
        self.calls.borrow_mut().push(command.clone());

        self.processes
            .borrow_mut()
            .pop_front()
            .map(|p| Box::new(p) as Box<dyn RunningCommand>)
            .ok_or_else(|| Error::command_spawn_failed(command, "no scripted process"))
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.on_path
            .iter()
            .any(|p| p == program)
            .then(|| PathBuf::from("/usr/local/bin").join(program))
    }
}

/// Interactive process with fixed output and exit behavior.
#[derive(Clone)]
pub struct FakeProcess {
    output: String,
    exit: Option<ProcessExit>,
    killed: Arc<AtomicBool>,
}

impl FakeProcess {
    /// Prints `output` and exits with the given success flag.
    pub fn exiting(output: &str, success: bool) -> Self {
        Self {
            output: output.to_string(),
            exit: Some(ProcessExit {
                success,
                code: Some(if success { 0 } else { 1 }),
            }),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Prints `output` and never exits until killed.
    pub fn hanging(output: &str) -> Self {
        Self {
            output: output.to_string(),
            exit: None,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kill_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.killed)
    }
}

impl RunningCommand for FakeProcess {
    fn output(&self) -> String {
        self.output.clone()
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(Some(ProcessExit {
                success: false,
                code: None,
            }));
        }
        Ok(self.exit)
    }

    fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

/// Records opened URLs and optionally fails.
#[derive(Default)]
pub struct RecordingBrowser {
    pub fail: bool,
    pub opened: RefCell<Vec<String>>,
}

impl BrowserOpener for RecordingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.borrow_mut().push(url.to_string());
        if self.fail {
            return Err(Error::command_spawn_failed("xdg-open", "not found"));
        }
        Ok(())
    }
}
