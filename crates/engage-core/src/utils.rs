//! Shared utility functions for Engage crates

use anyhow::anyhow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so that
/// sudo-wrapped invocations that preserve HOME resolve the same deployment.
pub fn get_home_dir() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home));
    }

    dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// Write `contents` to `path` through a sibling temp file and rename.
///
/// When `mode` is given the temp file gets those permission bits before the
/// rename, so the final file is never visible with wider permissions.
pub fn write_atomic(path: &Path, contents: &[u8], mode: Option<u32>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "engage".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = fs::File::create(&tmp)?;
        set_mode(&tmp, mode)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&tmp, path)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}
