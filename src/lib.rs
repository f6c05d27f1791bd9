//! layerpack library
//!
//! Builds the deployable Prisma client layer archive for an AWS Lambda
//! Node.js runtime from a project's central schema and an environment file.

pub mod archive;
pub mod build_state;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod paths;
pub mod process_guard;
pub mod prune;
pub mod removal;
pub mod sanity;
pub mod schema_patch;
pub mod staging;
pub mod toolchain;

// Re-export main types for convenience
pub use archive::ArchiveSummary;
pub use build_state::{BuildContext, BuildStage, StageTiming, TransitionError};
pub use builder::{BuildPlan, BuildReport, LayerBuilder, PlannedStep};
pub use config::LayerLayout;
pub use error::{LayerError, PatchError, ToolError};
pub use paths::LayerPaths;
pub use process_guard::{ActiveTool, CommandProcessGroup};
pub use removal::{RemovalOutcome, RemovalPolicy, RemovalStatus, RemovalTarget, TargetKind};
pub use schema_patch::{patch_schema_file, patch_schema_text, PatchOutcome};
pub use toolchain::{ProcessRunner, ToolCommand, ToolRunner};
