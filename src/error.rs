//! Error handling module for layerpack
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Each pipeline concern has its own enum; `LayerError` is what the builder returns.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::build_state::{BuildStage, TransitionError};

/// Main error type for a layer build
#[derive(Error, Debug)]
pub enum LayerError {
    /// The environment file named on the command line does not exist
    #[error("Cannot find env file at: {}", .0.display())]
    EnvFileNotFound(PathBuf),

    /// The central schema file does not exist
    #[error("Cannot find schema at: {}", .0.display())]
    SchemaNotFound(PathBuf),

    /// A directory the build expects to already exist is missing
    #[error("Missing directory: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Copying an input into the staging directory failed
    #[error("Failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Removing a file or directory failed under a fatal policy
    #[error("Failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A glob pattern for pruning could not be compiled
    #[error("Invalid glob pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Schema patching failed
    #[error("Schema patch failed: {0}")]
    Patch(#[from] PatchError),

    /// An external tool failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Walking the layer directory failed
    #[error("Failed to walk layer directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Writing the zip archive failed
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Invalid build stage transition
    #[error("Build transition error: {0}")]
    Transition(#[from] TransitionError),

    /// A stage failed; wraps the underlying error with the stage it happened in
    #[error("Build aborted while {stage}: {source}")]
    Aborted {
        stage: BuildStage,
        #[source]
        source: Box<LayerError>,
    },

    /// IO errors not covered above
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for layer build operations
pub type Result<T> = std::result::Result<T, LayerError>;

impl LayerError {
    /// Wrap an error with the stage at which the build stopped
    pub fn aborted(stage: BuildStage, source: LayerError) -> Self {
        Self::Aborted {
            stage,
            source: Box::new(source),
        }
    }

    /// Stage the build was in when this error was raised, if recorded
    pub fn stage(&self) -> Option<BuildStage> {
        match self {
            Self::Aborted { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, skipping any `Aborted` wrapper
    pub fn root(&self) -> &LayerError {
        match self {
            Self::Aborted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Failures while rewriting the staged schema
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write backup {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write patched schema next to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot replace {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures of an external toolchain invocation
#[derive(Error, Debug)]
pub enum ToolError {
    /// Program is not installed or not on PATH
    #[error("Tool not found: {program} (is it installed and on PATH?)")]
    NotFound { program: String },

    /// Process ran but reported failure; `code` is None when killed by a signal
    #[error("{label} failed (exit code {})", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExitedNonZero { label: String, code: Option<i32> },

    /// Process exceeded the configured timeout and was terminated
    #[error("{label} timed out after {}s", .after.as_secs())]
    TimedOut { label: String, after: Duration },

    #[error("Failed to spawn {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting for {label}: {source}")]
    Wait {
        label: String,
        #[source]
        source: io::Error,
    },
}
