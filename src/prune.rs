//! Strips generated artifacts the deployed layer does not need.
//!
//! The Lambda runtime ships its own engine via the `rhel-openssl` binary target,
//! so the locally downloaded engines, the Prisma CLI and npm's caches only add
//! weight to the archive.

use tracing::info;

use crate::config::LayerLayout;
use crate::error::Result;
use crate::paths::LayerPaths;
use crate::removal::{self, RemovalOutcome};

/// Apply the prune table to the staging directory. Also removes the schema backup.
pub fn prune_artifacts(paths: &LayerPaths, layout: &LayerLayout) -> Result<Vec<RemovalOutcome>> {
    let outcomes = removal::remove_all(&paths.staging_dir, &layout.prune_targets())?;
    info!("node_modules cleaned");
    Ok(outcomes)
}
