mod tar_gz;

use crate::runtime::Runtime;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub use tar_gz::TarGzExtractor;

/// A file or symlink written by an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedEntry {
    File(PathBuf),
    Symlink { path: PathBuf, target: PathBuf },
}

/// Trait for format-specific archive extractors
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into `extract_to`. A single top-level directory
    /// shared by every entry is stripped. Returns the files and symlinks written.
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<Vec<ExtractedEntry>>;
}
