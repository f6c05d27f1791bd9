//! Build State Machine
//!
//! Tracks how far a layer build has progressed and enforces that stages run
//! strictly in order.
//!
//! # Stage Flow
//!
//! ```text
//! Start
//!     ↓
//! ArgsValidated
//!     ↓
//! Staged
//!     ↓
//! Patched
//!     ↓
//! ToolchainRun
//!     ↓
//! Pruned
//!     ↓
//! Archived
//!     ↓
//! Done
//!
//! (Any non-terminal stage can transition to Aborted)
//! ```
//!
//! Aborting does not roll back filesystem changes made by completed stages.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use strum::EnumIter;
use thiserror::Error;

/// Build stages in sequential order. Each variant names the state reached once
/// the corresponding work has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumIter)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BuildStage {
    Start = 0,
    ArgsValidated = 1,
    Staged = 2,
    Patched = 3,
    ToolchainRun = 4,
    Pruned = 5,
    Archived = 6,
    Done = 7,
    /// Terminal failure state
    Aborted = 255,
}

impl BuildStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true for `Done` and `Aborted`
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Returns the next stage in the sequence, or None at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::ArgsValidated),
            Self::ArgsValidated => Some(Self::Staged),
            Self::Staged => Some(Self::Patched),
            Self::Patched => Some(Self::ToolchainRun),
            Self::ToolchainRun => Some(Self::Pruned),
            Self::Pruned => Some(Self::Archived),
            Self::Archived => Some(Self::Done),
            Self::Done | Self::Aborted => None,
        }
    }

    /// Describes the work that leads into this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::Start => "starting",
            Self::ArgsValidated => "validating arguments",
            Self::Staged => "staging inputs",
            Self::Patched => "patching schema",
            Self::ToolchainRun => "running toolchain",
            Self::Pruned => "pruning artifacts",
            Self::Archived => "archiving layer",
            Self::Done => "finishing",
            Self::Aborted => "aborted",
        }
    }

    /// All stages in order (excluding Aborted)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::Start,
            Self::ArgsValidated,
            Self::Staged,
            Self::Patched,
            Self::ToolchainRun,
            Self::Pruned,
            Self::Archived,
            Self::Done,
        ]
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot skip from {from:?} to {to:?}")]
    SkippedStage { from: BuildStage, to: BuildStage },

    #[error("Cannot go backwards from {from:?} to {to:?}")]
    BackwardTransition { from: BuildStage, to: BuildStage },

    #[error("Cannot transition from terminal stage {from:?}")]
    FromTerminalState { from: BuildStage },

    #[error("Already at stage {stage:?}")]
    AlreadyAtStage { stage: BuildStage },
}

/// Time spent reaching a stage
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: BuildStage,
    pub millis: u64,
}

/// Owns the current stage of a build and validates every transition.
///
/// ```
/// use layerpack::build_state::{BuildContext, BuildStage};
///
/// let mut ctx = BuildContext::new();
/// ctx.advance().unwrap();
/// assert_eq!(ctx.current_stage(), BuildStage::ArgsValidated);
///
/// // Cannot skip stages
/// assert!(ctx.transition_to(BuildStage::Patched).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct BuildContext {
    current: BuildStage,
    failed_at: Option<BuildStage>,
    timings: Vec<StageTiming>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext {
    pub fn new() -> Self {
        Self {
            current: BuildStage::Start,
            failed_at: None,
            timings: Vec::with_capacity(BuildStage::all_stages().len()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> BuildStage {
        self.current
    }

    /// Stage whose work was in progress when the build aborted
    #[inline]
    pub fn failed_at(&self) -> Option<BuildStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.current == BuildStage::Done
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.current == BuildStage::Aborted
    }

    /// Per-stage durations recorded by `complete`
    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    /// The stage that the next `advance` would enter
    pub fn pending(&self) -> Option<BuildStage> {
        self.current.next()
    }

    /// Advance to the next stage in sequence.
    pub fn advance(&mut self) -> Result<BuildStage, TransitionError> {
        match self.current.next() {
            Some(next) => {
                self.current = next;
                Ok(next)
            }
            None => Err(TransitionError::FromTerminalState { from: self.current }),
        }
    }

    /// Advance and record how long the stage's work took.
    pub fn complete(&mut self, elapsed: Duration) -> Result<BuildStage, TransitionError> {
        let stage = self.advance()?;
        self.timings.push(StageTiming {
            stage,
            millis: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(stage)
    }

    /// Transition to a specific stage, which must be the immediate next one.
    pub fn transition_to(&mut self, target: BuildStage) -> Result<BuildStage, TransitionError> {
        if self.current.is_terminal() {
            return Err(TransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(TransitionError::AlreadyAtStage { stage: target });
        }
        if target == BuildStage::Aborted {
            return Err(TransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        if target.order() < self.current.order() {
            return Err(TransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(TransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.current = target;
        Ok(target)
    }

    /// Mark the build as aborted, remembering the stage that was being worked on.
    ///
    /// Returns that stage.
    pub fn abort(&mut self) -> Result<BuildStage, TransitionError> {
        let pending = self
            .current
            .next()
            .ok_or(TransitionError::FromTerminalState { from: self.current })?;
        self.failed_at = Some(pending);
        self.current = BuildStage::Aborted;
        Ok(pending)
    }
}
