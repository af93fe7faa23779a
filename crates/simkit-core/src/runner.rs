//! Execution of external host commands.
//!
//! Every interaction with the host (`xcrun`, `lsof`, `open`, `pgrep`,
//! `osascript`, `applesimutils`) goes through the [`CommandRunner`] trait so
//! that the rest of the crate can be exercised against a scripted runner.

use async_trait::async_trait;
use tracing::debug;

use crate::error::SimulatorError;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The most useful diagnostic text: stderr, falling back to stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs a program to completion and captures its output.
///
/// Implementations must not interpret the exit status; callers decide what a
/// non-zero exit means for their operation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] that spawns real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
        debug!(program, ?args, "Running command");
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs a command and converts spawn failures into
/// [`SimulatorError::Environment`] tagged with `operation`.
///
/// The exit status is left for the caller to judge.
pub async fn run_raw(
    runner: &dyn CommandRunner,
    operation: &str,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, SimulatorError> {
    runner
        .run(program, args)
        .await
        .map_err(|e| SimulatorError::environment(operation, format!("could not run {program}: {e}")))
}

/// Runs a command and fails with [`SimulatorError::Environment`] unless it
/// exits with status 0.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    operation: &str,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, SimulatorError> {
    let output = run_raw(runner, operation, program, args).await?;
    if !output.success() {
        return Err(exit_error(operation, &output));
    }
    Ok(output)
}

/// Error for a command that ran but exited unsuccessfully.
pub(crate) fn exit_error(operation: &str, output: &CommandOutput) -> SimulatorError {
    let status = match output.code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    let diagnostic = output.diagnostic();
    if diagnostic.is_empty() {
        SimulatorError::environment(operation, status)
    } else {
        SimulatorError::environment(operation, format!("{status}: {diagnostic}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRunner(std::io::Result<CommandOutput>);

    #[async_trait]
    impl CommandRunner for FixedRunner {
        async fn run(&self, _program: &str, _args: &[&str]) -> std::io::Result<CommandOutput> {
            match &self.0 {
                Ok(out) => Ok(out.clone()),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[test]
    fn diagnostic_prefers_stderr() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "ignored".into(),
            stderr: "  boom \n".into(),
        };
        assert_eq!(out.diagnostic(), "boom");

        let out = CommandOutput {
            code: Some(1),
            stdout: "from stdout\n".into(),
            stderr: String::new(),
        };
        assert_eq!(out.diagnostic(), "from stdout");
    }

    #[tokio::test]
    async fn run_checked_rejects_non_zero_exit() {
        let runner = FixedRunner(Ok(CommandOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "Invalid device: nope".into(),
        }));
        let err = run_checked(&runner, "boot", "xcrun", &["simctl", "boot", "nope"])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boot failed: exit status 2: Invalid device: nope");
    }

    #[tokio::test]
    async fn run_checked_reports_spawn_failure() {
        let runner = FixedRunner(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        )));
        let err = run_checked(&runner, "lsof", "lsof", &["-aUc", "launchd_sim"])
            .await
            .unwrap_err();
        match err {
            SimulatorError::Environment { operation, message } => {
                assert_eq!(operation, "lsof");
                assert!(message.contains("could not run lsof"));
            }
            other => panic!("Expected Environment, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_raw_keeps_non_zero_output() {
        let runner = FixedRunner(Ok(CommandOutput {
            code: Some(1),
            ..Default::default()
        }));
        let out = run_raw(&runner, "pgrep", "pgrep", &["-x", "Simulator"]).await.unwrap();
        assert_eq!(out.code, Some(1));
    }

    #[tokio::test]
    async fn process_runner_reports_missing_binary() {
        let result = ProcessRunner
            .run("simkit-definitely-not-a-real-binary", &[])
            .await;
        assert!(result.is_err());
    }
}
