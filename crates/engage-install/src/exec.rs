//! Subprocess execution for drivers

use std::io;

use engage_core::UserError;
use tracing::debug;

use crate::errors;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub(crate) fn status_text(&self) -> String {
        match self.status {
            Some(code) => format!("exit status {}", code),
            None => "termination by signal".to_string(),
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Program and arguments that run `command` through `sh -c`
pub fn shell(command: &str) -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), command.to_string()])
}

/// Run a program and capture its output without checking the exit status
pub fn run_command(program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
    run_expression(program, duct::cmd(program, args))
}

/// Run a program, failing with [`errors::COMMAND_FAILED`] on a non-zero exit
pub fn run_checked(program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
    let output = run_command(program, args)?;
    ensure_success(&display_command(program, args), output)
}

pub(crate) fn run_expression(program: &str, expression: duct::Expression) -> anyhow::Result<CommandOutput> {
    let result = expression
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run();

    match result {
        Ok(output) => {
            let output = CommandOutput::from(output);
            debug!("{} finished with {}", program, output.status_text());
            Ok(output)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(UserError::new(&errors::MISSING_EXECUTABLE)
                .arg("program", program)
                .into())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn ensure_success(command: &str, output: CommandOutput) -> anyhow::Result<CommandOutput> {
    if output.success() {
        return Ok(output);
    }
    Err(UserError::new(&errors::COMMAND_FAILED)
        .arg("command", command)
        .arg("status", output.status_text())
        .with_developer_message(format!(
            "stdout:\n{}\nstderr:\n{}",
            output.stdout.trim_end(),
            output.stderr.trim_end()
        ))
        .into())
}

/// Printable form of a command line for logs and error messages
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let (program, args) = shell("echo hello; echo oops 1>&2");
        let output = run_checked(&program, &args).unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_non_zero_exit_is_command_failed() {
        let (program, args) = shell("echo bad 1>&2; exit 3");
        let err = run_checked(&program, &args).unwrap_err();
        let user = err.downcast_ref::<UserError>().unwrap();
        assert!(user.is(&errors::COMMAND_FAILED));
        assert_eq!(user.message_args.get("status").unwrap(), "exit status 3");
        assert!(user.developer_message.as_deref().unwrap().contains("bad"));
    }

    #[test]
    fn test_unchecked_run_reports_status() {
        let (program, args) = shell("exit 1");
        let output = run_command(&program, &args).unwrap();
        assert!(!output.success());
    }

    #[test]
    fn test_missing_program_is_environment_error() {
        let err = run_command("engage-definitely-missing-binary", &[]).unwrap_err();
        let user = err.downcast_ref::<UserError>().unwrap();
        assert!(user.is(&errors::MISSING_EXECUTABLE));
    }
}
