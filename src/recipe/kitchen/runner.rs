// src/recipe/kitchen/runner.rs

//! Build-system execution

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use super::plan::{BuildPhase, BuildStep};

/// Captured result of one build step
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub phase: BuildPhase,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    /// Combined output for diagnostics
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            _ => self.stderr.trim_end().to_string(),
        }
    }
}

/// Runs build steps
///
/// The kitchen talks to the build system only through this trait so tests
/// can substitute a recorder for meson.
pub trait BuildRunner: Send + Sync {
    /// Run a step in `workdir` with `env` added to the environment
    ///
    /// A step that ran but exited unsuccessfully is `Ok` with
    /// `success == false`; `Err` means it could not be run at all.
    fn run(&self, step: &BuildStep, workdir: &Path, env: &BTreeMap<String, String>)
    -> Result<StepOutput>;
}

/// Runs steps as child processes
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl BuildRunner for CommandRunner {
    fn run(
        &self,
        step: &BuildStep,
        workdir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<StepOutput> {
        info!("Running {} phase", step.phase);
        debug!("Command: {}", step.command_line());

        let mut child = Command::new(&step.program)
            .args(&step.args)
            .current_dir(workdir)
            .envs(env)
            .env("MAKEFLAGS", format!("-j{}", step.jobs))
            .env("MESON_NUM_PROCESSES", step.jobs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::IoError(format!("Failed to run {} phase: {}", step.phase, e)))?;

        // Drain both pipes while waiting so a chatty build cannot block on a full pipe
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                warn!("{} phase timed out after {}s", step.phase, self.timeout.as_secs());
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::BuildFailure {
                    phase: step.phase.to_string(),
                    output: format!("timed out after {} seconds", self.timeout.as_secs()),
                });
            }
        };

        let stdout = stdout.map(join_drain).unwrap_or_default();
        let stderr = stderr.map(join_drain).unwrap_or_default();

        Ok(StepOutput {
            phase: step.phase,
            success: status.success(),
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_drain(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_step(script: &str) -> BuildStep {
        BuildStep {
            phase: BuildPhase::Compile,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            jobs: 3,
        }
    }

    #[test]
    fn test_command_runner_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(Duration::from_secs(30));
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hi".to_string());

        let out = runner
            .run(&sh_step("echo $GREETING $MAKEFLAGS; echo oops >&2"), dir.path(), &env)
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hi -j3");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.combined(), "hi -j3\noops");
    }

    #[test]
    fn test_command_runner_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(Duration::from_secs(30));
        let out = runner
            .run(&sh_step("echo broken >&2; exit 3"), dir.path(), &BTreeMap::new())
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.combined(), "broken");
    }

    #[test]
    fn test_command_runner_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(Duration::from_millis(200));
        let result = runner.run(&sh_step("sleep 5"), dir.path(), &BTreeMap::new());
        assert!(matches!(result, Err(Error::BuildFailure { .. })));
    }
}
