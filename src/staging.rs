//! Staging preparation: copy the build inputs into the layer and clear stale
//! artifacts left by the previous run.

use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::LayerLayout;
use crate::error::{LayerError, Result};
use crate::paths::LayerPaths;
use crate::removal::{self, RemovalOutcome};

/// Copy the env file and schema into staging, then clear stale artifacts.
///
/// The staging directory must already exist. Existing `.env` and schema copies
/// are overwritten.
pub fn prepare_staging(paths: &LayerPaths, layout: &LayerLayout) -> Result<Vec<RemovalOutcome>> {
    if !paths.staging_dir.is_dir() {
        return Err(LayerError::MissingDirectory(paths.staging_dir.clone()));
    }

    let env_name = paths
        .env_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!("Copying {} as {}", env_name, layout.staged_env_file);
    copy_into_staging(&paths.env_file, &paths.staged_env(layout))?;

    info!("Copying {} ...", layout.schema_file);
    copy_into_staging(&paths.schema_source(layout), &paths.staged_schema(layout))?;

    removal::remove_all(&paths.staging_dir, &layout.staging_cleanup())
}

fn copy_into_staging(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|source| LayerError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    Ok(())
}
