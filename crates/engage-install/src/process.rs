//! Service liveness
//!
//! A service is considered running while the process named in its pid file
//! exists. After `start` or `stop` the sequencer polls until the service
//! reaches the expected state or the poll budget runs out.

use std::fs;
use std::io;
use std::path::Path;

use engage_core::poll::{poll_until, PollError, PollPolicy};
use engage_core::UserError;

use crate::context::InstallContext;
use crate::errors;
use crate::manager::ServiceManager;

/// Read a pid file; a missing or empty file yields `None`
pub fn read_pid_file(path: &Path) -> io::Result<Option<i32>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i32>()
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", path.display(), e)))
}

/// True if a process with `pid` exists
#[cfg(unix)]
pub fn process_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // Exists but belongs to another user
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: i32) -> bool {
    false
}

/// True if the pid file names a live process
pub fn pid_file_alive(path: &Path) -> io::Result<bool> {
    Ok(read_pid_file(path)?.is_some_and(process_alive))
}

/// Expected service state while polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    Stopped,
}

impl Liveness {
    fn describe(self) -> &'static str {
        match self {
            Liveness::Running => "running",
            Liveness::Stopped => "stopped",
        }
    }
}

/// Poll `service` until it is in `expected` state.
///
/// Fails with [`errors::LIVENESS_TIMEOUT`] once the budget is spent.
pub fn wait_for(
    ctx: &InstallContext,
    resource_id: &str,
    service: &dyn ServiceManager,
    expected: Liveness,
) -> anyhow::Result<()> {
    let policy: PollPolicy = ctx.poll_policy();
    let what = format!("{} to be {}", resource_id, expected.describe());

    let result = poll_until(&policy, &what, || {
        service
            .is_running(ctx)
            .map(|running| running == (expected == Liveness::Running))
    });

    match result {
        Ok(_) => Ok(()),
        Err(PollError::Exhausted {
            attempts,
            total_duration,
            ..
        }) => Err(UserError::new(&errors::LIVENESS_TIMEOUT)
            .arg("id", resource_id)
            .arg("state", expected.describe())
            .arg("attempts", attempts)
            .arg("seconds", format!("{:.1}", total_duration.as_secs_f64()))
            .for_resource(resource_id)
            .into()),
        Err(PollError::Check(e)) => Err(e),
    }
}
