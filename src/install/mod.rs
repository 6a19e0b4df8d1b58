//! Install orchestration.
//!
//! Detect the platform, resolve the version, build the plan, pick the bin
//! dir, then download and place every artifact. The GPU driver step runs
//! last and never fails the run.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    archive::{ArchiveExtractor, ExtractedEntry, TarGzExtractor},
    bin_dir::{select_bin_dir, system_candidates, user_candidates},
    cleanup::{self, SharedCleanupContext},
    config::Config,
    download::download_file,
    driver::DriverAction,
    error::InstallError,
    http::HttpClient,
    manifest::resolve_version,
    plan::{InstallPlan, build_install_plan},
    platform::{Os, PlatformDescriptor, PlatformDetector, UnameDetector},
    runtime::Runtime,
};

mod drivers;
mod files;
mod preview;

pub use drivers::install_cuda_driver;
pub use files::{LIBRARY_PATTERNS, is_library_name};
pub use preview::{PlanReport, PlanRequest};

/// Flags of the `install` subcommand.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Install here instead of searching PATH
    pub bin_dir: Option<PathBuf>,
    /// Search `~/.local/bin` and `~/bin` instead of the system directories
    pub user: bool,
    pub skip_drivers: bool,
    /// Do not ask before installing GPU drivers
    pub yes: bool,
}

/// What a completed run installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub plan: InstallPlan,
    pub bin_dir: PathBuf,
    pub installed: Vec<PathBuf>,
    /// `None` when the driver step did not run
    pub driver: Option<DriverAction>,
}

#[tracing::instrument(skip(runtime, config, options))]
pub async fn install<R: Runtime + 'static>(
    runtime: R,
    config: Config,
    options: InstallOptions,
) -> Result<()> {
    let http = HttpClient::with_defaults()?;
    let installer = Installer::new(&runtime, &config, http, TarGzExtractor);
    let report = installer
        .run(&UnameDetector::new(&runtime), &options)
        .await?;
    installer.print_install_success(&report);
    Ok(())
}

/// Resolve the plan without installing anything and print it as JSON.
#[tracing::instrument(skip(runtime, config, request))]
pub async fn plan<R: Runtime + 'static>(
    runtime: R,
    config: Config,
    request: PlanRequest,
) -> Result<()> {
    let http = HttpClient::with_defaults()?;
    let installer = Installer::new(&runtime, &config, http, TarGzExtractor);
    let report = installer
        .preview(&UnameDetector::new(&runtime), &request)
        .await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize plan")?
    );
    Ok(())
}

pub struct Installer<'a, R: Runtime, E: ArchiveExtractor> {
    pub runtime: &'a R,
    pub config: &'a Config,
    pub http: HttpClient,
    pub extractor: E,
}

impl<'a, R: Runtime + 'static, E: ArchiveExtractor> Installer<'a, R, E> {
    pub fn new(runtime: &'a R, config: &'a Config, http: HttpClient, extractor: E) -> Self {
        Self {
            runtime,
            config,
            http,
            extractor,
        }
    }

    #[tracing::instrument(skip(self, detector))]
    pub async fn run<D: PlatformDetector>(
        &self,
        detector: &D,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        let platform = detector.detect()?.resolve()?;
        println!("   detected {} {}", platform.os, platform.arch);
        if platform.is_wsl2() {
            info!("Running under WSL2");
        }

        let version = resolve_version(self.config, &self.http).await?;
        let plan = build_install_plan(&platform, &version, &self.config.bucket_url)?;
        debug!("Install plan: {:?}", plan);

        let bin_dir = self.resolve_bin_dir(options)?;
        println!("  installing kuzco {} into {}", version, bin_dir.display());

        // Set up cleanup context for Ctrl-C handling
        let cleanup_ctx = cleanup::new_shared();
        let work_dir = self.create_work_dir(&cleanup_ctx)?;
        let cleanup_ctx_clone = Arc::clone(&cleanup_ctx);

        let ctrl_c_handler = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, cleaning up...");
                cleanup::lock(&cleanup_ctx_clone).run_all();
                std::process::exit(130);
            }
        });

        let result = self
            .install_all(&platform, plan, &bin_dir, &work_dir, options)
            .await;

        ctrl_c_handler.abort();
        cleanup::lock(&cleanup_ctx).run_all();

        result
    }

    async fn install_all(
        &self,
        platform: &PlatformDescriptor,
        mut plan: InstallPlan,
        bin_dir: &Path,
        work_dir: &Path,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        let mut installed = Vec::new();

        for artifact in plan.binaries() {
            let staged = work_dir.join(artifact.install_name);
            download_file(self.runtime, &artifact.url, &staged, &self.http).await?;

            let dest = bin_dir.join(artifact.install_name);
            files::place_executable(self.runtime, &staged, &dest)?;
            println!("   installed {}", dest.display());
            installed.push(dest);
        }

        if let Some(url) = &plan.lib_archive_url {
            let libraries = self.install_library_archive(url, bin_dir, work_dir).await?;
            println!("   installed {} libraries", libraries.len());
            installed.extend(libraries);
        }

        let driver = if platform.os == Os::Linux && !options.skip_drivers {
            let action = self.plan_drivers(platform, &plan.version);
            plan = attach_gpu_runtime(plan, &action);
            if let Err(e) = self.apply_driver_action(&action, work_dir, options.yes).await {
                warn!(
                    "GPU driver installation failed: {:#}. kuzco is installed; install the drivers manually.",
                    e
                );
            }
            Some(action)
        } else {
            None
        };

        Ok(InstallReport {
            plan,
            bin_dir: bin_dir.to_path_buf(),
            installed,
            driver,
        })
    }

    async fn install_library_archive(
        &self,
        url: &str,
        bin_dir: &Path,
        work_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let name = url.rsplit('/').next().unwrap_or("lib.tar.gz");
        let archive = work_dir.join(name);
        download_file(self.runtime, url, &archive, &self.http).await?;

        let entries = self.extract(&archive, &work_dir.join("lib"))?;
        files::install_libraries(self.runtime, &entries, bin_dir)
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<ExtractedEntry>> {
        if !self.extractor.can_handle(archive) {
            bail!("Unsupported archive format: {:?}", archive);
        }
        self.extractor.extract(self.runtime, archive, dest)
    }

    /// An explicit `--bin-dir` is used as is. Otherwise a directory on PATH is
    /// chosen, and a system directory additionally needs root.
    #[tracing::instrument(skip(self))]
    pub fn resolve_bin_dir(&self, options: &InstallOptions) -> Result<PathBuf> {
        if let Some(dir) = &options.bin_dir {
            self.runtime
                .create_dir_all(dir)
                .with_context(|| format!("Failed to create bin dir {:?}", dir))?;
            return Ok(dir.clone());
        }

        let path_var = self.runtime.env_var("PATH").unwrap_or_default();
        if options.user {
            return Ok(select_bin_dir(&path_var, &user_candidates(self.runtime))?);
        }

        let dir = select_bin_dir(&path_var, &system_candidates())?;
        if !self.runtime.is_privileged() {
            return Err(InstallError::PermissionDenied(dir).into());
        }
        Ok(dir)
    }

    fn create_work_dir(&self, cleanup_ctx: &SharedCleanupContext) -> Result<PathBuf> {
        let dir = self
            .runtime
            .temp_dir()
            .join(format!("kuzco-install-{}", std::process::id()));
        self.runtime
            .create_dir_all(&dir)
            .with_context(|| format!("Failed to create work dir {:?}", dir))?;
        cleanup::lock(cleanup_ctx).remove_path(dir.clone());
        debug!("Work dir: {:?}", dir);
        Ok(dir)
    }

    fn print_install_success(&self, report: &InstallReport) {
        println!("{}", self.success_message(report));
    }

    fn success_message(&self, report: &InstallReport) -> String {
        format!(
            "   installed kuzco {} {}\n   get started at {}\n   api endpoint {}",
            report.plan.version,
            report.bin_dir.display(),
            self.config.web_url,
            self.config.api_url
        )
    }
}

/// Record the ROCm bundle in the plan when driver planning chose it.
fn attach_gpu_runtime(plan: InstallPlan, action: &DriverAction) -> InstallPlan {
    match action {
        DriverAction::DownloadAndExtractRocm { url, .. } => plan.with_gpu_runtime(url.clone()),
        _ => plan,
    }
}
