//! The optional GPU driver step. Every failure here is reported as a warning.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::Path;

use super::Installer;
use crate::archive::ArchiveExtractor;
use crate::download::download_file;
use crate::driver::{
    AptInstaller, CUDA_DRIVER_PACKAGE, CudaRepo, DriverAction, DriverContext, DriverInstaller,
    OsRelease, PackageManager, YumDnfInstaller, plan_driver_install,
};
use crate::gpu::{GpuKind, detect_gpu};
use crate::platform::PlatformDescriptor;
use crate::runtime::Runtime;

impl<R: Runtime + 'static, E: ArchiveExtractor> Installer<'_, R, E> {
    /// Inspect the host and decide what the driver step should do.
    #[tracing::instrument(skip(self, platform))]
    pub fn plan_drivers(&self, platform: &PlatformDescriptor, version: &str) -> DriverAction {
        let gpu = detect_gpu(self.runtime);
        let os_release = OsRelease::load(self.runtime).unwrap_or_else(|e| {
            warn!("{:#}", e);
            OsRelease::default()
        });
        let package_manager = if gpu == GpuKind::Nvidia {
            PackageManager::detect(self.runtime, &os_release)
                .map_err(|e| warn!("{}", e))
                .ok()
        } else {
            None
        };

        let ctx = DriverContext {
            gpu,
            package_manager,
            os_release: &os_release,
            arch: platform.arch,
            version,
        };
        let action = plan_driver_install(self.runtime, self.config, &ctx);
        debug!("Driver plan: {:?}", action);
        action
    }

    /// Carry out a planned driver action. Needs root, and confirmation unless `yes`.
    #[tracing::instrument(skip(self, work_dir))]
    pub async fn apply_driver_action(
        &self,
        action: &DriverAction,
        work_dir: &Path,
        yes: bool,
    ) -> Result<()> {
        let description = match action {
            DriverAction::Skip { reason } => {
                println!("   skipping GPU drivers: {}", reason);
                return Ok(());
            }
            DriverAction::Unsupported { reason } => {
                warn!("GPU drivers cannot be installed automatically: {}", reason);
                return Ok(());
            }
            DriverAction::InstallCudaDriver { repo, .. } => {
                format!("NVIDIA drivers from the {} CUDA repository", repo.distro)
            }
            DriverAction::DownloadAndExtractRocm { dest, .. } => {
                format!("the ROCm runtime into {}", dest.display())
            }
        };

        if !self.runtime.is_privileged() {
            warn!(
                "Installing {} requires root. Re-run with sudo to install GPU drivers.",
                description
            );
            return Ok(());
        }
        if !yes && !self.runtime.confirm(&format!("Install {}?", description))? {
            println!("   skipping GPU drivers");
            return Ok(());
        }

        println!("  installing {}", description);
        match action {
            DriverAction::InstallCudaDriver {
                repo,
                package_manager: PackageManager::Apt,
            } => {
                let installer = AptInstaller::new(self.runtime, &self.http, work_dir);
                install_cuda_driver(&installer, repo).await
            }
            DriverAction::InstallCudaDriver {
                repo,
                package_manager,
            } => {
                let installer = YumDnfInstaller::new(self.runtime, &self.http, *package_manager);
                install_cuda_driver(&installer, repo).await
            }
            DriverAction::DownloadAndExtractRocm { url, dest } => {
                self.install_rocm(url, dest, work_dir).await
            }
            DriverAction::Skip { .. } | DriverAction::Unsupported { .. } => Ok(()),
        }
    }

    async fn install_rocm(&self, url: &str, dest: &Path, work_dir: &Path) -> Result<()> {
        let name = url.rsplit('/').next().unwrap_or("rocm.tar.gz");
        let archive = work_dir.join(name);
        download_file(self.runtime, url, &archive, &self.http).await?;

        self.runtime.create_dir_all(dest)?;
        let entries = self
            .extract(&archive, dest)
            .with_context(|| format!("Failed to extract ROCm runtime into {:?}", dest))?;
        debug!("Extracted {} ROCm entries", entries.len());
        Ok(())
    }
}

/// Register the CUDA repository, then install the driver package.
pub async fn install_cuda_driver<I: DriverInstaller + ?Sized>(
    installer: &I,
    repo: &CudaRepo,
) -> Result<()> {
    installer.install_cuda_repo(repo).await?;
    installer.install_package(CUDA_DRIVER_PACKAGE).await
}
