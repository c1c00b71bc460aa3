//! Subprocess execution for cluster and container tooling.
//!
//! Everything cluster-specific (`sbatch`, `runai`, `kubectl`, `docker`)
//! goes through [`CommandRunner`] so backends can be exercised in tests
//! with a scripted runner instead of a real cluster.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// A cluster command that could not be run or exited non-zero.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Runs a program to completion and returns its trimmed stdout.
///
/// Any non-zero exit is an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

/// Runs commands on the local host with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let command = render_command(program, args);
        debug!(%command, "running command");

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Shell-like rendering of a command line, for logs and errors.
pub fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_trimmed_stdout() {
        let out = SystemRunner.run("echo", &["hello", "swarm"]).await.unwrap();
        assert_eq!(out, "hello swarm");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let err = SystemRunner.run("false", &[]).await.unwrap_err();
        match err {
            CommandError::Failed { command, code, .. } => {
                assert_eq!(command, "false");
                assert_ne!(code, 0);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = SystemRunner
            .run("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn render_joins_with_spaces() {
        assert_eq!(render_command("scancel", &["42"]), "scancel 42");
        assert_eq!(render_command("squeue", &[]), "squeue");
    }
}
