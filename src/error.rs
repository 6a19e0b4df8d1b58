//! Named failure conditions of an install run.

use std::path::PathBuf;

/// Errors that abort the base install. Each message names the offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    /// Kernel name other than `Linux` or `Darwin`
    UnsupportedOs(String),
    /// Machine architecture with no canonical mapping
    UnsupportedArch(String),
    /// OS and architecture resolve individually but have no artifacts
    UnsupportedPlatform { os: String, arch: String },
    /// A required external tool is not installed
    MissingDependency(String),
    /// Non-2xx response or transport failure
    DownloadFailure { url: String, reason: String },
    /// No package-manager branch for this distribution
    UnsupportedDistro { id: String, version: String },
    /// WSL1 kernel; carries the kernel release string
    Wsl1Unsupported(String),
    /// Version manifest without a usable `cli-latest` value
    InvalidManifest(String),
    /// None of the candidate directories is on the search path
    NoBinDir { candidates: Vec<PathBuf> },
    /// Installing into a directory that requires root
    PermissionDenied(PathBuf),
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::UnsupportedOs(os) => {
                write!(f, "Unsupported operating system: {}", os)
            }
            InstallError::UnsupportedArch(arch) => {
                write!(f, "Unsupported architecture: {}", arch)
            }
            InstallError::UnsupportedPlatform { os, arch } => {
                write!(f, "Unsupported platform: os={} arch={}", os, arch)
            }
            InstallError::MissingDependency(tool) => {
                write!(f, "Required tool not found: {}. Install it and try again.", tool)
            }
            InstallError::DownloadFailure { url, reason } => {
                write!(f, "Download failed for {}: {}", url, reason)
            }
            InstallError::UnsupportedDistro { id, version } => {
                write!(f, "Unsupported distribution: {} {}", id, version)
            }
            InstallError::Wsl1Unsupported(release) => {
                write!(
                    f,
                    "WSL1 is not supported (kernel {}). Upgrade with `wsl --set-version <distro> 2` and try again.",
                    release
                )
            }
            InstallError::InvalidManifest(reason) => {
                write!(f, "Invalid version manifest: {}", reason)
            }
            InstallError::NoBinDir { candidates } => {
                let list = candidates
                    .iter()
                    .map(|c| c.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "None of [{}] is on PATH. Pass --bin-dir to choose an install directory.",
                    list
                )
            }
            InstallError::PermissionDenied(dir) => {
                write!(
                    f,
                    "Installing into {} requires root. Re-run with sudo, or use --user.",
                    dir.display()
                )
            }
        }
    }
}

impl std::error::Error for InstallError {}
