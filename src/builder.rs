//! Runs the layer build from start to finish.
//!
//! Stages execute strictly in order and communicate only through the
//! filesystem. The first fatal error aborts the build; nothing already done is
//! rolled back.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

use crate::archive::{self, ArchiveSummary};
use crate::build_state::{BuildContext, BuildStage, StageTiming};
use crate::config::LayerLayout;
use crate::error::{LayerError, Result};
use crate::paths::LayerPaths;
use crate::prune;
use crate::removal::{RemovalOutcome, RemovalTarget};
use crate::sanity::REQUIRED_BINARIES;
use crate::schema_patch::{self, PatchOutcome};
use crate::staging;
use crate::toolchain::{self, ToolCommand, ToolRunner};

/// Everything a successful build did
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub env_file: PathBuf,
    pub staging_dir: PathBuf,
    pub staging_cleanup: Vec<RemovalOutcome>,
    pub patch: PatchOutcome,
    /// Command lines run, in order
    pub toolchain: Vec<String>,
    pub pruned: Vec<RemovalOutcome>,
    pub previous_archive: RemovalOutcome,
    pub archive: ArchiveSummary,
    pub stages: Vec<StageTiming>,
}

/// One action a build would take, for dry runs
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub stage: BuildStage,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub paths: LayerPaths,
    pub steps: Vec<PlannedStep>,
}

/// Builds one layer archive
pub struct LayerBuilder<'a> {
    paths: LayerPaths,
    layout: LayerLayout,
    runner: &'a dyn ToolRunner,
}

impl<'a> LayerBuilder<'a> {
    pub fn new(paths: LayerPaths, layout: LayerLayout, runner: &'a dyn ToolRunner) -> Self {
        Self {
            paths,
            layout,
            runner,
        }
    }

    pub fn paths(&self) -> &LayerPaths {
        &self.paths
    }

    /// Check every input exists and the toolchain is on PATH. Modifies nothing.
    pub fn validate(&self) -> Result<()> {
        validate_inputs(&self.paths, &self.layout)?;
        self.runner.preflight(REQUIRED_BINARIES)?;
        Ok(())
    }

    /// Describe what `run` would do without touching the filesystem.
    ///
    /// Fails the same way the first stage of `run` would.
    pub fn plan(&self) -> Result<BuildPlan> {
        self.validate()?;

        let paths = &self.paths;
        let layout = &self.layout;
        let mut steps = Vec::new();
        let mut push = |stage: BuildStage, action: String| steps.push(PlannedStep { stage, action });

        push(
            BuildStage::ArgsValidated,
            format!("check {} are on PATH", REQUIRED_BINARIES.join(", ")),
        );

        push(
            BuildStage::Staged,
            format!(
                "copy {} -> {}",
                paths.env_file.display(),
                paths.staged_env(layout).display()
            ),
        );
        push(
            BuildStage::Staged,
            format!(
                "copy {} -> {}",
                paths.schema_source(layout).display(),
                paths.staged_schema(layout).display()
            ),
        );
        for target in layout.staging_cleanup() {
            push(BuildStage::Staged, describe_removal(&paths.staging_dir, &target));
        }

        push(
            BuildStage::Patched,
            format!(
                "replace lines containing '{}' in {} with '{}'",
                layout.marker,
                paths.staged_schema(layout).display(),
                layout.replacement_line.trim()
            ),
        );

        for tool in toolchain::prisma_toolchain(layout) {
            push(
                BuildStage::ToolchainRun,
                format!("run `{}` in {}", tool.command_line(), paths.staging_dir.display()),
            );
        }

        for target in layout.prune_targets() {
            push(BuildStage::Pruned, describe_removal(&paths.staging_dir, &target));
        }

        push(
            BuildStage::Archived,
            format!("delete {} (best_effort)", paths.archive.display()),
        );
        push(
            BuildStage::Archived,
            format!(
                "zip {} -> {}",
                paths.layer_dir.display(),
                paths.archive.display()
            ),
        );

        Ok(BuildPlan {
            paths: paths.clone(),
            steps,
        })
    }

    /// Run every stage in order.
    ///
    /// Errors are wrapped in [`LayerError::Aborted`] naming the stage that failed.
    pub fn run(self) -> Result<BuildReport> {
        let mut ctx = BuildContext::new();
        run_stage(&mut ctx, || self.validate())?;

        let Self {
            paths,
            layout,
            runner,
        } = self;
        let tools: Vec<ToolCommand> = toolchain::prisma_toolchain(&layout);

        let staging_cleanup = run_stage(&mut ctx, || staging::prepare_staging(&paths, &layout))?;

        let patch = run_stage(&mut ctx, || {
            Ok(schema_patch::patch_schema_file(&paths.staged_schema(&layout), &layout)?)
        })?;

        run_stage(&mut ctx, || {
            Ok(toolchain::run_toolchain(runner, &tools, &paths.staging_dir)?)
        })?;

        let pruned = run_stage(&mut ctx, || prune::prune_artifacts(&paths, &layout))?;

        let (previous_archive, archive) = run_stage(&mut ctx, || {
            archive::replace_archive(&paths.layer_dir, &paths.archive)
        })?;

        ctx.advance()?;
        info!("All done, layer archive created at {}", archive.path.display());

        Ok(BuildReport {
            env_file: paths.env_file,
            staging_dir: paths.staging_dir,
            staging_cleanup,
            patch,
            toolchain: tools.iter().map(ToolCommand::command_line).collect(),
            pruned,
            previous_archive,
            archive,
            stages: ctx.timings().to_vec(),
        })
    }
}

/// Run one stage's work and advance, or abort the context on failure.
fn run_stage<T>(ctx: &mut BuildContext, work: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(stage) = ctx.pending() {
        info!("Stage: {}", stage);
    }
    let start = Instant::now();
    match work() {
        Ok(value) => {
            ctx.complete(start.elapsed())?;
            Ok(value)
        }
        Err(e) => {
            let stage = ctx.abort()?;
            error!("Build aborted while {}: {}", stage, e);
            Err(LayerError::aborted(stage, e))
        }
    }
}

/// Check every input exists before anything is modified
fn validate_inputs(paths: &LayerPaths, layout: &LayerLayout) -> Result<()> {
    if !paths.env_file.is_file() {
        return Err(LayerError::EnvFileNotFound(paths.env_file.clone()));
    }
    let schema = paths.schema_source(layout);
    if !schema.is_file() {
        return Err(LayerError::SchemaNotFound(schema));
    }
    if !paths.staging_dir.is_dir() {
        return Err(LayerError::MissingDirectory(paths.staging_dir.clone()));
    }
    Ok(())
}

fn describe_removal(base: &std::path::Path, target: &RemovalTarget) -> String {
    format!(
        "delete {} {} ({})",
        target.kind,
        base.join(&target.relative).display(),
        target.policy
    )
}
