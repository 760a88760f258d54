//! Privilege escalation through sudo
//!
//! The password is written to sudo's stdin (`sudo -S -p ""`); it never
//! appears in arguments, the environment or logs.

use engage_core::UserError;
use engage_secrets::SecureString;
use tracing::{debug, info};

use crate::errors;
use crate::exec::{display_command, ensure_success, run_expression, CommandOutput};

/// Name of the user running the engine
pub fn current_user() -> String {
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }
    lookup_user().unwrap_or_else(|| "unknown".to_string())
}

#[cfg(unix)]
fn lookup_user() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::geteuid())
        .ok()
        .flatten()
        .map(|user| user.name)
}

#[cfg(not(unix))]
fn lookup_user() -> Option<String> {
    None
}

/// True when the engine already runs as root
#[cfg(unix)]
pub fn is_superuser() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_superuser() -> bool {
    false
}

/// Runs commands as root via sudo
#[derive(Debug, Clone)]
pub struct SudoRunner {
    program: String,
}

impl Default for SudoRunner {
    fn default() -> Self {
        Self::new("sudo")
    }
}

impl SudoRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to sudo for `program args...`
    pub fn sudo_args(&self, program: &str, args: &[String]) -> Vec<String> {
        let mut sudo_args = vec![
            "-S".to_string(),
            "-p".to_string(),
            String::new(),
            "--".to_string(),
            program.to_string(),
        ];
        sudo_args.extend(args.iter().cloned());
        sudo_args
    }

    /// Run `program args...` as root.
    ///
    /// Runs directly when already root. Otherwise `password` is required and
    /// is fed to sudo on stdin. Fails with [`errors::COMMAND_FAILED`] on a
    /// non-zero exit, with stdout and stderr in the developer message.
    pub fn run(
        &self,
        program: &str,
        args: &[String],
        password: Option<&SecureString>,
    ) -> anyhow::Result<CommandOutput> {
        let command = display_command(program, args);

        if is_superuser() {
            debug!("Already root, running {} directly", command);
            let output = run_expression(program, duct::cmd(program, args))?;
            return ensure_success(&command, output);
        }

        let Some(password) = password else {
            return Err(UserError::new(&errors::SUDO_PASSWORD_REQUIRED)
                .arg("command", &command)
                .arg("user", current_user())
                .into());
        };

        info!("Running as superuser: {}", command);
        let mut stdin = password.as_bytes().to_vec();
        stdin.push(b'\n');

        let expression =
            duct::cmd(&self.program, self.sudo_args(program, args)).stdin_bytes(stdin);
        let output = run_expression(&self.program, expression)?;
        ensure_success(&command, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sudo_args_keep_password_off_command_line() {
        let runner = SudoRunner::new("sudo");
        let args = runner.sudo_args("apt-get", &["install".to_string(), "-y".to_string()]);
        assert_eq!(args, vec!["-S", "-p", "", "--", "apt-get", "install", "-y"]);
    }

    #[test]
    fn test_missing_password_is_environment_error() {
        if is_superuser() {
            return;
        }
        let err = SudoRunner::default()
            .run("true", &[], None)
            .unwrap_err();
        let user = err.downcast_ref::<UserError>().unwrap();
        assert!(user.is(&errors::SUDO_PASSWORD_REQUIRED));
        assert_eq!(user.category, engage_core::ErrorCategory::Environment);
    }

    #[test]
    fn test_current_user_is_not_empty() {
        assert!(!current_user().is_empty());
    }
}
