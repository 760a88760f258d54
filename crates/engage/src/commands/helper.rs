//! Elevated backup helper, run by the parent process through sudo

use anyhow::{Context, Result};
use engage_backup::HelperManifest;
use tracing::debug;

use crate::cli::BackupHelperArgs;

pub fn run(args: BackupHelperArgs) -> Result<()> {
    let manifest = HelperManifest::read(args.manifest.as_std_path())
        .with_context(|| format!("Failed to read helper manifest {}", args.manifest))?;
    debug!("Running backup helper for {}", manifest.archive.display());
    manifest.execute()
}
