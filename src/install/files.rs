//! Placing downloaded executables and shared libraries into the bin dir.

use anyhow::{Context, Result};
use goblin::Hint;
use log::{debug, info};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::archive::ExtractedEntry;
use crate::runtime::Runtime;

/// File name patterns of shared libraries shipped in the library archive.
pub const LIBRARY_PATTERNS: [&str; 3] = ["*.so", "*.so.*", "*.dylib"];

const EXECUTABLE_MODE: u32 = 0o755;
const DATA_MODE: u32 = 0o644;

/// True if the file name matches any of [`LIBRARY_PATTERNS`].
pub fn is_library_name(name: &str) -> bool {
    LIBRARY_PATTERNS.iter().any(|pattern| {
        glob::Pattern::new(pattern)
            .map(|p| p.matches(name))
            .unwrap_or(false)
    })
}

/// Copy `src` to `dest`, replacing whatever is there, and fix mode and owner.
#[tracing::instrument(skip(runtime))]
pub fn place_file<R: Runtime>(runtime: &R, src: &Path, dest: &Path, mode: u32) -> Result<()> {
    remove_existing(runtime, dest)?;
    runtime
        .copy(src, dest)
        .with_context(|| format!("Failed to install {:?}", dest))?;
    runtime.set_permissions(dest, mode)?;
    if runtime.is_privileged() {
        runtime.chown_root(dest)?;
    }
    Ok(())
}

pub fn place_executable<R: Runtime>(runtime: &R, src: &Path, dest: &Path) -> Result<()> {
    place_file(runtime, src, dest, EXECUTABLE_MODE)
}

fn remove_existing<R: Runtime>(runtime: &R, dest: &Path) -> Result<()> {
    if runtime.is_symlink(dest) || runtime.exists(dest) {
        debug!("Replacing existing {:?}", dest);
        runtime.remove_file(dest)?;
    }
    Ok(())
}

/// Install the library files among `entries` into `bin_dir`, then recreate
/// their symlinks. Entries whose names do not look like libraries are ignored.
#[tracing::instrument(skip(runtime, entries))]
pub fn install_libraries<R: Runtime>(
    runtime: &R,
    entries: &[ExtractedEntry],
    bin_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut installed = Vec::new();

    for entry in entries {
        let ExtractedEntry::File(src) = entry else {
            continue;
        };
        let Some(dest) = library_dest(src, bin_dir) else {
            continue;
        };
        let mode = library_mode(runtime, src);
        place_file(runtime, src, &dest, mode)?;
        info!("Installed library {:?}", dest);
        installed.push(dest);
    }

    for entry in entries {
        let ExtractedEntry::Symlink { path, target } = entry else {
            continue;
        };
        let Some(dest) = library_dest(path, bin_dir) else {
            continue;
        };
        remove_existing(runtime, &dest)?;
        runtime.symlink(target, &dest)?;
        debug!("Linked {:?} -> {:?}", dest, target);
        installed.push(dest);
    }

    Ok(installed)
}

fn library_dest(src: &Path, bin_dir: &Path) -> Option<PathBuf> {
    let name = src.file_name()?.to_str()?;
    is_library_name(name).then(|| bin_dir.join(name))
}

/// Native objects get 755, anything else (linker scripts, data) 644.
/// Only the magic bytes are read.
fn library_mode<R: Runtime>(runtime: &R, path: &Path) -> u32 {
    let mut header = [0u8; 16];
    let readable = runtime
        .open(path)
        .map(|mut file| file.read_exact(&mut header).is_ok())
        .unwrap_or(false);
    if !readable {
        return DATA_MODE;
    }

    match goblin::peek_bytes(&header) {
        Ok(Hint::Elf(_) | Hint::Mach(_) | Hint::MachFat(_)) => EXECUTABLE_MODE,
        _ => DATA_MODE,
    }
}
