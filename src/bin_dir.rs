//! Choosing the directory the binaries are installed into.

use std::path::{Path, PathBuf};

use crate::error::InstallError;
use crate::runtime::Runtime;

pub const SYSTEM_BIN_DIRS: [&str; 3] = ["/usr/local/bin", "/usr/bin", "/bin"];

/// Returns the first candidate that appears in the `:`-separated search path.
/// Trailing slashes on either side are ignored.
pub fn select_bin_dir(path_var: &str, candidates: &[PathBuf]) -> Result<PathBuf, InstallError> {
    let entries: Vec<&Path> = path_var
        .split(':')
        .map(|e| e.trim_end_matches('/'))
        .filter(|e| !e.is_empty())
        .map(Path::new)
        .collect();

    candidates
        .iter()
        .find(|candidate| {
            let candidate = Path::new(candidate.to_str().unwrap_or_default().trim_end_matches('/'));
            entries.iter().any(|entry| *entry == candidate)
        })
        .cloned()
        .ok_or_else(|| InstallError::NoBinDir {
            candidates: candidates.to_vec(),
        })
}

pub fn system_candidates() -> Vec<PathBuf> {
    SYSTEM_BIN_DIRS.iter().map(PathBuf::from).collect()
}

/// `~/.local/bin` then `~/bin`.
pub fn user_candidates<R: Runtime>(runtime: &R) -> Vec<PathBuf> {
    runtime
        .home_dir()
        .map(|home| vec![home.join(".local").join("bin"), home.join("bin")])
        .unwrap_or_default()
}
