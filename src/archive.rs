//! Zip packaging of the pruned layer.
//!
//! Entries are stored relative to the layer directory, so the archive root
//! holds the runtime folder (`nodejs/...`) the Lambda layer format expects.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{LayerError, Result};
use crate::removal::{self, RemovalOutcome, RemovalPolicy, RemovalTarget, TargetKind};

/// What was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Files, directories and symlinks stored
    pub entries: usize,
    /// Size of the archive on disk
    pub bytes: u64,
}

/// Delete any previous archive, then write a fresh one from `source_dir`.
///
/// Failure to delete the old archive is only logged; it is overwritten anyway.
pub fn replace_archive(source_dir: &Path, archive: &Path) -> Result<(RemovalOutcome, ArchiveSummary)> {
    let (dir, name) = split_archive_path(archive)?;
    info!("Deleting old {}", name);
    let target = RemovalTarget::new(name, TargetKind::File, RemovalPolicy::BestEffort);
    let status = removal::remove_target(dir, &target)?;

    let summary = create_archive(source_dir, archive)?;
    Ok((RemovalOutcome { target, status }, summary))
}

fn split_archive_path(archive: &Path) -> Result<(&Path, String)> {
    match (archive.parent(), archive.file_name()) {
        (Some(dir), Some(name)) => Ok((dir, name.to_string_lossy().into_owned())),
        _ => Err(LayerError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("archive path has no file name: {}", archive.display()),
        ))),
    }
}

/// Compress the whole of `source_dir` into a new zip at `archive`.
///
/// The zip is assembled in a temporary file beside `archive` and renamed into
/// place once complete.
pub fn create_archive(source_dir: &Path, archive: &Path) -> Result<ArchiveSummary> {
    if !source_dir.is_dir() {
        return Err(LayerError::MissingDirectory(source_dir.to_path_buf()));
    }
    info!("Zipping {} into {}", source_dir.display(), archive.display());

    let out_dir = archive.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(out_dir)?;
    let entries = {
        let mut zip = ZipWriter::new(BufWriter::new(tmp.as_file_mut()));
        let entries = write_tree(&mut zip, source_dir)?;
        zip.finish()?.flush()?;
        entries
    };

    tmp.persist(archive).map_err(|e| LayerError::Io(e.error))?;
    let bytes = fs::metadata(archive)?.len();

    info!("Wrote {} ({} entries, {} bytes)", archive.display(), entries, bytes);
    Ok(ArchiveSummary {
        path: archive.to_path_buf(),
        entries,
        bytes,
    })
}

fn write_tree<W: Write + io::Seek>(zip: &mut ZipWriter<W>, root: &Path) -> Result<usize> {
    let mut entries = 0;

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let Some(name) = entry_name(root, entry.path()) else {
            continue;
        };
        let file_type = entry.file_type();
        let options = entry_options(&entry)?;

        if file_type.is_dir() {
            debug!("adding dir {}/", name);
            zip.add_directory(format!("{}/", name), options)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            debug!("adding link {} -> {}", name, target.display());
            zip.add_symlink(name, target.to_string_lossy().into_owned(), options)?;
        } else if file_type.is_file() {
            debug!("adding {}", name);
            zip.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, zip)?;
        } else {
            debug!("skipping special file {}", entry.path().display());
            continue;
        }
        entries += 1;
    }

    Ok(entries)
}

/// Archive name for `path`: relative to `root`, `/`-separated. None for the root itself.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn entry_options(entry: &walkdir::DirEntry) -> Result<SimpleFileOptions> {
    let metadata = entry.metadata()?;
    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(metadata.len() >= u64::from(u32::MAX));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode() & 0o7777);
    }

    Ok(options)
}
