//! Lifecycle hooks around the gitpull, build and push phases.
//!
//! A hook is one shell command declared under `hooks.<stage>_<phase>` in the
//! application config. Undeclared hooks succeed without running anything.
//! Declared hooks run in an absolute working directory given to the child
//! process; the porter process never changes its own directory.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, HookFailedDetails, Result};
use crate::utils::command::run_shell;

/// A map of hook names (`pre_push`, ...) to shell commands.
pub type HookMap = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    GitPull,
    Build,
    Push,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::GitPull => "gitpull",
            Phase::Build => "build",
            Phase::Push => "push",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pre,
    Post,
}

/// Hook name for a stage of a phase, e.g. `post_gitpull`.
pub fn hook_name(stage: Stage, phase: Phase) -> String {
    let stage = match stage {
        Stage::Pre => "pre",
        Stage::Post => "post",
    };
    format!("{}_{}", stage, phase.as_str())
}

/// How a hook finished. A failing hook is an error, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookState {
    /// No command declared for the hook.
    Skipped,
    Succeeded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInvocation {
    pub hook: String,
    pub command: String,
    pub working_dir: PathBuf,
}

/// Result of running one hook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRunResult {
    pub hook: String,
    pub state: HookState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<HookInvocation>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

pub struct HookRunner<'a> {
    hooks: &'a HookMap,
    working_dir: PathBuf,
}

impl<'a> HookRunner<'a> {
    /// Relative working directories resolve against the current directory.
    pub fn new(hooks: &'a HookMap, working_dir: &Path) -> Result<Self> {
        let working_dir = if working_dir.is_absolute() {
            working_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::internal_io(e.to_string(), Some("resolve working directory".to_string())))?
                .join(working_dir)
        };
        Ok(Self { hooks, working_dir })
    }

    pub fn run_stage(&self, stage: Stage, phase: Phase) -> Result<HookRunResult> {
        self.run(&hook_name(stage, phase))
    }

    /// Run the named hook. A nonzero exit is a `hook.failed` error.
    pub fn run(&self, hook: &str) -> Result<HookRunResult> {
        let Some(command) = self.hooks.get(hook).filter(|c| !c.trim().is_empty()) else {
            return Ok(HookRunResult {
                hook: hook.to_string(),
                state: HookState::Skipped,
                invocation: None,
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        };

        let invocation = HookInvocation {
            hook: hook.to_string(),
            command: command.clone(),
            working_dir: self.working_dir.clone(),
        };
        log_status!(
            "hook",
            "Running {} hook [{}] at {}",
            hook,
            command,
            self.working_dir.display()
        );

        let output = run_shell(command, Some(&self.working_dir));
        if !output.success {
            return Err(Error::hook_failed(HookFailedDetails {
                hook: hook.to_string(),
                command: command.clone(),
                working_dir: self.working_dir.display().to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }));
        }

        Ok(HookRunResult {
            hook: hook.to_string(),
            state: HookState::Succeeded,
            invocation: Some(invocation),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
