//! Policy-driven deletion of staged files and directories.
//!
//! Every path the build deletes is listed with an explicit [`RemovalPolicy`],
//! so whether a failure aborts the build never depends on what the path is called.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use strum::Display;
use tracing::{debug, error, info, warn};

use crate::error::{LayerError, Result};

/// What happens when a target cannot be removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RemovalPolicy {
    /// Target must exist; absence or any failure aborts the build
    Required,
    /// Absence is fine; any other failure aborts the build
    IfPresent,
    /// Failures are logged and the build continues
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetKind {
    Dir,
    File,
    /// Glob pattern; every match is removed as a file
    Glob,
}

/// One entry of a removal table, relative to a base directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalTarget {
    pub relative: String,
    pub kind: TargetKind,
    pub policy: RemovalPolicy,
}

impl RemovalTarget {
    pub fn new(relative: impl Into<String>, kind: TargetKind, policy: RemovalPolicy) -> Self {
        Self {
            relative: relative.into(),
            kind,
            policy,
        }
    }
}

/// Result of applying one removal target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemovalStatus {
    /// Number of paths deleted (always 1 for files and directories)
    Removed { count: usize },
    /// Nothing to delete
    Absent,
    /// Deletion failed but the policy allowed the build to continue
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalOutcome {
    pub target: RemovalTarget,
    #[serde(flatten)]
    pub status: RemovalStatus,
}

/// Apply every target in order, stopping at the first fatal failure.
pub fn remove_all(base: &Path, targets: &[RemovalTarget]) -> Result<Vec<RemovalOutcome>> {
    targets
        .iter()
        .map(|target| {
            remove_target(base, target).map(|status| RemovalOutcome {
                target: target.clone(),
                status,
            })
        })
        .collect()
}

/// Remove a single target under `base` according to its policy.
pub fn remove_target(base: &Path, target: &RemovalTarget) -> Result<RemovalStatus> {
    let path = base.join(&target.relative);
    debug!("Deleting {} ({}, {})", path.display(), target.kind, target.policy);

    match target.kind {
        TargetKind::Dir => apply_policy(&path, target.policy, fs::remove_dir_all(&path)),
        TargetKind::File => apply_policy(&path, target.policy, fs::remove_file(&path)),
        TargetKind::Glob => remove_glob(&path, target.policy),
    }
}

fn apply_policy(path: &Path, policy: RemovalPolicy, result: io::Result<()>) -> Result<RemovalStatus> {
    match result {
        Ok(()) => {
            info!("Deleted {}", path.display());
            Ok(RemovalStatus::Removed { count: 1 })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && policy == RemovalPolicy::IfPresent => {
            info!("{} doesn't exist, skipping deletion", path.display());
            Ok(RemovalStatus::Absent)
        }
        Err(e) if policy == RemovalPolicy::BestEffort => {
            warn!("Error deleting {} (continuing): {}", path.display(), e);
            Ok(RemovalStatus::Skipped {
                reason: e.to_string(),
            })
        }
        Err(e) => {
            error!("Error deleting {}: {}", path.display(), e);
            Err(LayerError::Remove {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}

fn remove_glob(pattern_path: &Path, policy: RemovalPolicy) -> Result<RemovalStatus> {
    let pattern = escaped_pattern(pattern_path);
    let entries = glob::glob(&pattern).map_err(|source| LayerError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut removed = 0;
    for entry in entries {
        let (path, result) = match entry {
            Ok(path) => {
                let result = fs::remove_file(&path);
                (path, result)
            }
            Err(e) => (e.path().to_path_buf(), Err(e.into())),
        };
        if let RemovalStatus::Removed { .. } = apply_policy(&path, policy, result)? {
            removed += 1;
        }
    }

    if removed > 0 {
        return Ok(RemovalStatus::Removed { count: removed });
    }
    match policy {
        RemovalPolicy::Required => {
            error!("No files match {}", pattern);
            Err(LayerError::Remove {
                path: PathBuf::from(pattern),
                source: io::Error::new(io::ErrorKind::NotFound, "no matching files"),
            })
        }
        RemovalPolicy::IfPresent | RemovalPolicy::BestEffort => {
            info!("No files match {}, skipping deletion", pattern);
            Ok(RemovalStatus::Absent)
        }
    }
}

/// Escape the directory part so only the file-name pattern is interpreted
fn escaped_pattern(pattern_path: &Path) -> String {
    let file_pattern = pattern_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match pattern_path.parent() {
        Some(parent) => {
            let dir = glob::Pattern::escape(&parent.to_string_lossy());
            format!("{}/{}", dir, file_pattern)
        }
        None => file_pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target(rel: &str, kind: TargetKind, policy: RemovalPolicy) -> RemovalTarget {
        RemovalTarget::new(rel, kind, policy)
    }

    #[test]
    fn test_removes_existing_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("node_modules/a/b")).unwrap();
        std::fs::write(temp.path().join("node_modules/a/b/c.js"), "x").unwrap();

        let status = remove_target(
            temp.path(),
            &target("node_modules", TargetKind::Dir, RemovalPolicy::Required),
        )
        .unwrap();

        assert_eq!(status, RemovalStatus::Removed { count: 1 });
        assert!(!temp.path().join("node_modules").exists());
    }

    #[test]
    fn test_if_present_tolerates_absence() {
        let temp = TempDir::new().unwrap();
        let status = remove_target(
            temp.path(),
            &target("node_modules", TargetKind::Dir, RemovalPolicy::IfPresent),
        )
        .unwrap();
        assert_eq!(status, RemovalStatus::Absent);
    }

    #[test]
    fn test_required_absence_is_fatal() {
        let temp = TempDir::new().unwrap();
        let err = remove_target(
            temp.path(),
            &target("node_modules/prisma", TargetKind::Dir, RemovalPolicy::Required),
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Remove { .. }));
    }

    #[test]
    fn test_if_present_other_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        // A directory where a file is expected is not "absent"
        std::fs::create_dir(temp.path().join("package-lock.json")).unwrap();
        let err = remove_target(
            temp.path(),
            &target("package-lock.json", TargetKind::File, RemovalPolicy::IfPresent),
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Remove { .. }));
    }

    #[test]
    fn test_best_effort_never_fails() {
        let temp = TempDir::new().unwrap();
        let status = remove_target(
            temp.path(),
            &target("yarn.lock", TargetKind::File, RemovalPolicy::BestEffort),
        )
        .unwrap();
        assert!(matches!(status, RemovalStatus::Skipped { .. }));
    }

    #[test]
    fn test_glob_removes_matches_only() {
        let temp = TempDir::new().unwrap();
        let client = temp.path().join("node_modules/.prisma/client");
        std::fs::create_dir_all(&client).unwrap();
        std::fs::write(client.join("query_engine-rhel.so.node"), "bin").unwrap();
        std::fs::write(client.join("query_engine-debian.so.node"), "bin").unwrap();
        std::fs::write(client.join("index.js"), "js").unwrap();

        let status = remove_target(
            temp.path(),
            &target(
                "node_modules/.prisma/client/query_engine*",
                TargetKind::Glob,
                RemovalPolicy::IfPresent,
            ),
        )
        .unwrap();

        assert_eq!(status, RemovalStatus::Removed { count: 2 });
        assert!(client.join("index.js").exists());
    }

    #[test]
    fn test_glob_without_matches_is_absent() {
        let temp = TempDir::new().unwrap();
        let status = remove_target(
            temp.path(),
            &target("missing/query_engine*", TargetKind::Glob, RemovalPolicy::IfPresent),
        )
        .unwrap();
        assert_eq!(status, RemovalStatus::Absent);
    }

    #[test]
    fn test_glob_escapes_base_directory() {
        let temp = TempDir::new().unwrap();
        let odd = temp.path().join("we[ird]");
        std::fs::create_dir_all(&odd).unwrap();
        std::fs::write(odd.join("query_engine-x"), "bin").unwrap();

        let status = remove_target(
            &odd,
            &target("query_engine*", TargetKind::Glob, RemovalPolicy::IfPresent),
        )
        .unwrap();
        assert_eq!(status, RemovalStatus::Removed { count: 1 });
    }

    #[test]
    fn test_remove_all_stops_at_fatal() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("keep-going.txt"), "x").unwrap();
        std::fs::write(temp.path().join("never-reached.txt"), "x").unwrap();

        let targets = vec![
            target("keep-going.txt", TargetKind::File, RemovalPolicy::Required),
            target("missing", TargetKind::Dir, RemovalPolicy::Required),
            target("never-reached.txt", TargetKind::File, RemovalPolicy::Required),
        ];

        assert!(remove_all(temp.path(), &targets).is_err());
        assert!(!temp.path().join("keep-going.txt").exists());
        assert!(temp.path().join("never-reached.txt").exists());
    }
}
