//! GPU driver planning.
//!
//! [`plan_driver_install`] only decides what should happen; the
//! [`DriverInstaller`] implementations carry it out through the host's
//! package manager. Nothing in this module is fatal to the base install.

mod cuda_repo;
mod installer;

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{Config, DEFAULT_ROCM_PATH};
use crate::error::InstallError;
use crate::gpu::GpuKind;
use crate::plan::rocm_runtime_url;
use crate::platform::Arch;
use crate::runtime::Runtime;

pub use cuda_repo::{CudaRepo, RepoKind, cuda_repo};
pub use installer::{
    AptInstaller, CUDA_DRIVER_PACKAGE, DriverInstaller, YUM_REPOS_DIR, YumDnfInstaller,
};
#[cfg(test)]
pub use installer::MockDriverInstaller;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";
pub const ROCM_PROBE_LIBRARY: &str = "libhipblas.so.2";

/// Identification fields of `/etc/os-release`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsRelease {
    pub id: String,
    pub version_id: String,
    pub id_like: Vec<String>,
}

impl OsRelease {
    pub fn parse(contents: &str) -> Self {
        let mut release = OsRelease::default();
        for line in contents.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key {
                "ID" => release.id = value.to_lowercase(),
                "VERSION_ID" => release.version_id = value.to_string(),
                "ID_LIKE" => {
                    release.id_like = value.split_whitespace().map(str::to_lowercase).collect()
                }
                _ => {}
            }
        }
        release
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R) -> Result<Self> {
        let contents = runtime
            .read_to_string(Path::new(OS_RELEASE_PATH))
            .context("Failed to read distribution information")?;
        Ok(Self::parse(&contents))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
}

impl PackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
        }
    }

    fn repo_kind(&self) -> RepoKind {
        match self {
            PackageManager::Apt => RepoKind::AptKeyring,
            PackageManager::Dnf | PackageManager::Yum => RepoKind::YumRepoFile,
        }
    }

    /// First available of apt-get, dnf, yum.
    pub fn detect<R: Runtime>(runtime: &R, release: &OsRelease) -> Result<Self, InstallError> {
        [PackageManager::Apt, PackageManager::Dnf, PackageManager::Yum]
            .into_iter()
            .find(|pm| runtime.find_program(pm.program()).is_some())
            .ok_or_else(|| InstallError::UnsupportedDistro {
                id: release.id.clone(),
                version: release.version_id.clone(),
            })
    }
}

/// Outcome of driver planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DriverAction {
    Skip { reason: String },
    DownloadAndExtractRocm { url: String, dest: PathBuf },
    InstallCudaDriver { repo: CudaRepo, package_manager: PackageManager },
    Unsupported { reason: String },
}

impl DriverAction {
    fn skip(reason: impl Into<String>) -> Self {
        DriverAction::Skip {
            reason: reason.into(),
        }
    }

    fn unsupported(reason: impl Into<String>) -> Self {
        DriverAction::Unsupported {
            reason: reason.into(),
        }
    }
}

/// Everything driver planning needs to know about the host.
#[derive(Debug, Clone)]
pub struct DriverContext<'a> {
    pub gpu: GpuKind,
    pub package_manager: Option<PackageManager>,
    pub os_release: &'a OsRelease,
    pub arch: Arch,
    pub version: &'a str,
}

#[tracing::instrument(skip(runtime, config))]
pub fn plan_driver_install<R: Runtime>(
    runtime: &R,
    config: &Config,
    ctx: &DriverContext<'_>,
) -> DriverAction {
    match ctx.gpu {
        GpuKind::None => DriverAction::skip("no supported GPU detected"),
        GpuKind::Amd => match find_rocm_library(runtime, config) {
            Some(path) => DriverAction::skip(format!("ROCm already present at {}", path.display())),
            None => DriverAction::DownloadAndExtractRocm {
                url: rocm_runtime_url(&config.bucket_url, ctx.arch, ctx.version),
                dest: config.rocm_install_dir(),
            },
        },
        GpuKind::Nvidia => {
            if let Some(version) = installed_cuda_version(runtime) {
                return DriverAction::skip(format!("CUDA {} already installed", version));
            }
            plan_cuda(ctx)
        }
    }
}

fn plan_cuda(ctx: &DriverContext<'_>) -> DriverAction {
    let release = ctx.os_release;
    let Some(repo) = cuda_repo(&release.id, &release.version_id, ctx.arch) else {
        return DriverAction::unsupported(format!(
            "no CUDA repository for {} {}",
            release.id, release.version_id
        ));
    };
    let Some(package_manager) = ctx.package_manager else {
        return DriverAction::unsupported("no supported package manager found");
    };
    if package_manager.repo_kind() != repo.kind {
        return DriverAction::unsupported(format!(
            "{} cannot install the {} repository",
            package_manager.program(),
            repo.distro
        ));
    }
    DriverAction::InstallCudaDriver {
        repo,
        package_manager,
    }
}

/// Search order: `HIP_PATH`, `ROCM_PATH` (when set), then `/opt/rocm`.
pub fn rocm_search_dirs(config: &Config) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [config.hip_path.as_ref(), config.rocm_path.as_ref()]
        .into_iter()
        .flatten()
        .map(|p| p.join("lib"))
        .collect();
    dirs.push(Path::new(DEFAULT_ROCM_PATH).join("lib"));
    dirs
}

fn find_rocm_library<R: Runtime>(runtime: &R, config: &Config) -> Option<PathBuf> {
    rocm_search_dirs(config)
        .into_iter()
        .map(|dir| dir.join(ROCM_PROBE_LIBRARY))
        .find(|path| {
            let found = runtime.exists(path);
            debug!("ROCm probe {:?}: {}", path, found);
            found
        })
}

/// The `CUDA Version: x.y` reported by `nvidia-smi`, if any.
fn installed_cuda_version<R: Runtime>(runtime: &R) -> Option<String> {
    runtime.find_program("nvidia-smi")?;
    let output = runtime.run_command("nvidia-smi", &[]).ok()?;
    if !output.success {
        return None;
    }
    parse_cuda_version(&output.stdout)
}

pub fn parse_cuda_version(nvidia_smi_output: &str) -> Option<String> {
    let (_, rest) = nvidia_smi_output.split_once("CUDA Version:")?;
    let version = rest.split_whitespace().next()?.trim_end_matches('|');
    (!version.is_empty()).then(|| version.to_string())
}
