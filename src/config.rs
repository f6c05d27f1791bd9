//! Fixed layout of the layer project.
//!
//! Every name the build touches lives here. The values are compiled in; there is
//! no config file or environment variable that overrides them.

use serde::Serialize;

use crate::removal::{RemovalPolicy, RemovalTarget, TargetKind};

/// Marker that identifies the schema's binary-target line
pub const BINARY_TARGETS_MARKER: &str = "binaryTargets";

/// Replacement for the binary-target line, pinned to the Lambda runtime's OpenSSL
pub const LAMBDA_BINARY_TARGETS: &str = "  binaryTargets = [\"rhel-openssl-1.0.x\"]";

/// Names and relative offsets used to build the layer
#[derive(Debug, Clone, Serialize)]
pub struct LayerLayout {
    /// Central schema directory, relative to the project root
    pub schema_dir: &'static str,
    /// Schema file name, both in the central directory and in staging
    pub schema_file: &'static str,
    /// Directory holding layer sources and the output archive, relative to the project root
    pub layers_dir: &'static str,
    /// Layer name; used for the layer directory and the archive stem
    pub layer_name: &'static str,
    /// Staging subdirectory inside the layer directory
    pub runtime_dir: &'static str,
    /// Name the environment file is staged under
    pub staged_env_file: &'static str,
    /// Suffix appended to the schema file for its backup
    pub backup_suffix: &'static str,
    pub marker: &'static str,
    pub replacement_line: &'static str,
}

impl Default for LayerLayout {
    fn default() -> Self {
        Self {
            schema_dir: "prisma",
            schema_file: "schema.prisma",
            layers_dir: "layers",
            layer_name: "api_prisma_layer",
            runtime_dir: "nodejs",
            staged_env_file: ".env",
            backup_suffix: ".bak",
            marker: BINARY_TARGETS_MARKER,
            replacement_line: LAMBDA_BINARY_TARGETS,
        }
    }
}

impl LayerLayout {
    /// File name of the schema backup written by the patcher
    pub fn backup_file(&self) -> String {
        format!("{}{}", self.schema_file, self.backup_suffix)
    }

    /// File name of the output archive
    pub fn archive_file(&self) -> String {
        format!("{}.zip", self.layer_name)
    }

    /// Stale artifacts cleared from staging before the toolchain runs
    pub fn staging_cleanup(&self) -> Vec<RemovalTarget> {
        vec![
            RemovalTarget::new("node_modules", TargetKind::Dir, RemovalPolicy::IfPresent),
            RemovalTarget::new("yarn.lock", TargetKind::File, RemovalPolicy::BestEffort),
            RemovalTarget::new("package-lock.json", TargetKind::File, RemovalPolicy::BestEffort),
        ]
    }

    /// Generated artifacts stripped from staging after the toolchain runs
    pub fn prune_targets(&self) -> Vec<RemovalTarget> {
        vec![
            RemovalTarget::new(self.backup_file(), TargetKind::File, RemovalPolicy::BestEffort),
            RemovalTarget::new(
                "node_modules/@prisma/engines",
                TargetKind::Dir,
                RemovalPolicy::Required,
            ),
            RemovalTarget::new("node_modules/.bin", TargetKind::Dir, RemovalPolicy::BestEffort),
            RemovalTarget::new("node_modules/.cache", TargetKind::Dir, RemovalPolicy::BestEffort),
            RemovalTarget::new(
                "node_modules/.prisma/client/query_engine*",
                TargetKind::Glob,
                RemovalPolicy::IfPresent,
            ),
            RemovalTarget::new("node_modules/prisma", TargetKind::Dir, RemovalPolicy::Required),
        ]
    }
}
