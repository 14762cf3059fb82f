//! External command execution seam.
//!
//! The system executor spawns with `kill_on_drop`, so dropping the returned
//! future (deadline elapsed, shutdown signalled) also kills the subprocess.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::errors::{CrmError, CrmResult};

/// Runs a program and returns its combined stdout and stderr
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn combined_output(&self, program: &str, args: &[&str]) -> CrmResult<Vec<u8>>;
}

/// Executor backed by real subprocesses
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn combined_output(&self, program: &str, args: &[&str]) -> CrmResult<Vec<u8>> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CrmError::Command {
                command: command_line(program, args),
                message: e.to_string(),
            })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if !output.status.success() {
            return Err(CrmError::Command {
                command: command_line(program, args),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&combined).trim()
                ),
            });
        }

        Ok(combined)
    }
}

/// Render a program and its arguments for error messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        assert_eq!(
            command_line("crm", &["resource", "migrate", "msPostgresql", "pg02"]),
            "crm resource migrate msPostgresql pg02"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_combined_output_success() {
        let output = SystemExecutor
            .combined_output("sh", &["-c", "echo out; echo err 1>&2"])
            .await
            .unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let err = SystemExecutor
            .combined_output("sh", &["-c", "echo nope; exit 3"])
            .await
            .unwrap_err();
        match err {
            CrmError::Command { command, message } => {
                assert_eq!(command, "sh -c echo nope; exit 3");
                assert!(message.contains("nope"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let result = SystemExecutor
            .combined_output("definitely-not-a-real-program-pgswitch", &[])
            .await;
        assert!(matches!(result, Err(CrmError::Command { .. })));
    }
}
