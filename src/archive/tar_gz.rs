use crate::runtime::Runtime;
use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use log::debug;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, ExtractedEntry};

/// Extractor for .tar.gz / .tgz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<Vec<ExtractedEntry>> {
        debug!("Extracting {:?} to {:?}...", archive_path, extract_to);

        let entry_paths = list_entries(runtime, archive_path)?;
        let strip = common_root(&entry_paths);
        if let Some(root) = &strip {
            debug!("Stripping top-level directory {:?}", root);
        }

        runtime.create_dir_all(extract_to)?;

        let mut archive = open_archive(runtime, archive_path)?;
        let mut extracted = Vec::new();

        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?
        {
            let mut entry = entry.context("Failed to read archive entry")?;
            let entry_path = without_cur_dir(&entry.path()?);

            let relative = match &strip {
                Some(root) => entry_path.strip_prefix(root).unwrap_or(&entry_path).to_path_buf(),
                None => entry_path.clone(),
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            check_relative(&relative)?;
            let dest = extract_to.join(&relative);
            let entry_type = entry.header().entry_type();
            check_no_symlink_ancestor(runtime, extract_to, &relative, entry_type)?;

            match entry_type {
                EntryType::Directory => {
                    runtime.create_dir_all(&dest)?;
                }
                EntryType::Symlink => {
                    let target = entry
                        .link_name()?
                        .with_context(|| format!("Symlink {:?} has no target", entry_path))?
                        .into_owned();
                    create_parent(runtime, &dest)?;
                    runtime.symlink(&target, &dest)?;
                    extracted.push(ExtractedEntry::Symlink { path: dest, target });
                }
                kind if kind.is_file() => {
                    create_parent(runtime, &dest)?;
                    {
                        let mut writer = runtime.create_file(&dest)?;
                        std::io::copy(&mut entry, &mut writer)
                            .with_context(|| format!("Failed to extract {:?}", entry_path))?;
                    }
                    if let Ok(mode) = entry.header().mode() {
                        runtime.set_permissions(&dest, mode & 0o777)?;
                    }
                    extracted.push(ExtractedEntry::File(dest));
                }
                other => {
                    debug!("Skipping {:?} entry {:?}", other, entry_path);
                }
            }
        }

        debug!("Extracted {} entries", extracted.len());
        Ok(extracted)
    }
}

fn open_archive<R: Runtime>(
    runtime: &R,
    archive_path: &Path,
) -> Result<Archive<GzDecoder<Box<dyn std::io::Read + Send>>>> {
    let file = runtime
        .open(archive_path)
        .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

fn list_entries<R: Runtime>(runtime: &R, archive_path: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open_archive(runtime, archive_path)?;
    let mut paths = Vec::new();
    for entry in archive
        .entries()
        .with_context(|| format!("Failed to read archive {:?}", archive_path))?
    {
        let entry = entry.context("Failed to read archive entry")?;
        paths.push(without_cur_dir(&entry.path()?));
    }
    Ok(paths)
}

fn create_parent<R: Runtime>(runtime: &R, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        runtime.create_dir_all(parent)?;
    }
    Ok(())
}

/// The single top-level directory shared by all entries, if there is one.
fn common_root(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut root: Option<PathBuf> = None;
    let mut nested = false;

    for path in paths {
        let mut components = path.components();
        let Some(first) = components.next() else {
            continue;
        };
        let first = PathBuf::from(first.as_os_str());
        nested |= components.next().is_some();

        match &root {
            None => root = Some(first),
            Some(existing) if *existing == first => {}
            Some(_) => return None,
        }
    }

    if nested { root } else { None }
}

/// `./lib/a.so` and `lib/a.so` name the same entry.
fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn check_relative(path: &Path) -> Result<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!("Refusing to extract unsafe path {:?}", path),
        }
    }
    Ok(())
}

/// Refuse to write through a symlink created by an earlier entry. Symlink
/// entries only need their parents checked; the link itself is new.
fn check_no_symlink_ancestor<R: Runtime>(
    runtime: &R,
    extract_to: &Path,
    relative: &Path,
    entry_type: EntryType,
) -> Result<()> {
    let mut current = extract_to.to_path_buf();
    let components: Vec<_> = relative.components().collect();
    let checked = match entry_type {
        EntryType::Symlink => components.len().saturating_sub(1),
        _ => components.len(),
    };
    for component in &components[..checked] {
        current.push(component);
        if runtime.is_symlink(&current) {
            bail!(
                "Refusing to extract {:?} through symlink {:?}",
                relative,
                current
            );
        }
    }
    Ok(())
}
