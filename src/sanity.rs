//! Pre-flight checks for the build environment
//!
//! Verifies the toolchain binaries are on `PATH` before anything in staging is
//! touched, so a missing `npm` fails fast instead of after `node_modules` has
//! already been deleted.

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Binaries the toolchain invokes
pub const REQUIRED_BINARIES: &[&str] = &[
    "npm", // Dependency installation
    "npx", // dotenv-cli and the Prisma CLI
];

/// Locate `name` on the given search path
fn find_in(name: &str, search_path: &std::ffi::OsStr) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Check if a binary is available in PATH
pub fn binary_exists(name: &str) -> bool {
    let path = env::var_os("PATH").unwrap_or_default();
    find_in(name, &path).is_some()
}

/// Return the binaries from `required` that cannot be found
pub fn missing_binaries(required: &[&str]) -> Vec<String> {
    debug!("Running pre-flight checks for {:?}", required);
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !binary_exists(name))
        .map(|name| (*name).to_string())
        .collect();

    if missing.is_empty() {
        info!("Pre-flight checks passed: {}", required.join(", "));
    }
    missing
}
