//! Rewrites the binary-target line of the staged Prisma schema.
//!
//! The original file is kept as `<schema>.bak` until pruning. The patched text
//! is written to a temporary file in the same directory and renamed over the
//! original, so readers never see a half-written schema.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::LayerLayout;
use crate::error::PatchError;

/// Result of a successful patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    /// Number of lines that contained the marker
    pub replaced: usize,
    pub backup: PathBuf,
}

/// Replace every line containing `marker` with `replacement`.
///
/// `\n`, `\r\n` and a bare `\r` all end a line, and every terminator is
/// written back as `\n`. Replaced lines are always newline-terminated; other
/// lines keep their terminator, so an unterminated final line stays
/// unterminated. Returns the new text and the number of replaced lines.
pub fn patch_schema_text(input: &str, marker: &str, replacement: &str) -> (String, usize) {
    let mut output = String::with_capacity(input.len() + replacement.len());
    let mut replaced = 0;
    let mut rest = input;

    while !rest.is_empty() {
        let (line, terminated, next) = match rest.find(['\r', '\n']) {
            Some(end) => {
                let width = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
                (&rest[..end], true, &rest[end + width..])
            }
            None => (rest, false, ""),
        };

        if line.contains(marker) {
            output.push_str(replacement);
            output.push('\n');
            replaced += 1;
        } else {
            output.push_str(line);
            if terminated {
                output.push('\n');
            }
        }
        rest = next;
    }

    (output, replaced)
}

/// Patch the schema file at `path` in place, leaving a backup beside it.
///
/// Zero matching lines is not an error; the file is rewritten unchanged apart
/// from line-ending normalization and a warning is logged.
pub fn patch_schema_file(path: &Path, layout: &LayerLayout) -> Result<PatchOutcome, PatchError> {
    info!("Replacing binaryTargets in {}", path.display());

    let original = fs::read_to_string(path).map_err(|source| PatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let backup = backup_path(path, layout);
    fs::write(&backup, &original).map_err(|source| PatchError::Backup {
        path: backup.clone(),
        source,
    })?;

    let (patched, replaced) = patch_schema_text(&original, layout.marker, layout.replacement_line);
    replace_atomically(path, patched.as_bytes())?;

    if replaced == 0 {
        warn!(
            "No line containing '{}' found in {}; schema left as is",
            layout.marker,
            path.display()
        );
    } else {
        info!("Replaced {} {} line(s)", replaced, layout.marker);
    }

    Ok(PatchOutcome { replaced, backup })
}

fn backup_path(path: &Path, layout: &LayerLayout) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(layout.backup_suffix);
    path.with_file_name(name)
}

fn replace_atomically(path: &Path, contents: &[u8]) -> Result<(), PatchError> {
    let write_err = |source| PatchError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    // Temp files are created 0600; keep the schema's own mode
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(write_err)?;
    }

    tmp.persist(path).map_err(|e| PatchError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
