//! Resolves the absolute paths a build works with.
//!
//! Everything is derived from the project root (the current working directory
//! for the binary) plus the fixed offsets in [`LayerLayout`].

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::LayerLayout;
use crate::error::{LayerError, Result};

/// Absolute paths for one build
#[derive(Debug, Clone, Serialize)]
pub struct LayerPaths {
    pub project_root: PathBuf,
    /// Central directory holding the source schema
    pub schema_dir: PathBuf,
    /// Directory that also receives the output archive
    pub script_dir: PathBuf,
    /// Root of the archive; contains the staging directory
    pub layer_dir: PathBuf,
    /// Working copy of the layer contents
    pub staging_dir: PathBuf,
    /// Environment file selected on the command line
    pub env_file: PathBuf,
    pub archive: PathBuf,
}

impl LayerPaths {
    /// Resolve against the current working directory.
    pub fn resolve(env_file_name: &str, layout: &LayerLayout) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::from_project_root(&cwd, env_file_name, layout)
    }

    /// Resolve against an explicit project root.
    ///
    /// Fails with `EnvFileNotFound` if the environment file does not exist. Nothing
    /// on disk is modified.
    pub fn from_project_root(
        project_root: &Path,
        env_file_name: &str,
        layout: &LayerLayout,
    ) -> Result<Self> {
        let paths = Self::layout_only(project_root, env_file_name, layout);

        if !paths.env_file.is_file() {
            return Err(LayerError::EnvFileNotFound(paths.env_file));
        }

        info!("Using env file: {}", paths.env_file.display());
        debug!("Resolved paths: {:?}", paths);
        Ok(paths)
    }

    fn layout_only(project_root: &Path, env_file_name: &str, layout: &LayerLayout) -> Self {
        let schema_dir = project_root.join(layout.schema_dir);
        let script_dir = project_root.join(layout.layers_dir);
        let layer_dir = script_dir.join(layout.layer_name);
        let staging_dir = layer_dir.join(layout.runtime_dir);
        let archive = script_dir.join(layout.archive_file());

        Self {
            project_root: project_root.to_path_buf(),
            env_file: project_root.join(env_file_name),
            schema_dir,
            script_dir,
            layer_dir,
            staging_dir,
            archive,
        }
    }

    /// Source schema in the central directory
    pub fn schema_source(&self, layout: &LayerLayout) -> PathBuf {
        self.schema_dir.join(layout.schema_file)
    }

    /// Schema copy inside staging
    pub fn staged_schema(&self, layout: &LayerLayout) -> PathBuf {
        self.staging_dir.join(layout.schema_file)
    }

    /// Environment file copy inside staging
    pub fn staged_env(&self, layout: &LayerLayout) -> PathBuf {
        self.staging_dir.join(layout.staged_env_file)
    }
}
