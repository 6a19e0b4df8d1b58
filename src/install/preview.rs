//! The `plan` subcommand: everything `install` would decide, without side effects.

use anyhow::Result;
use log::debug;
use serde::Serialize;

use super::{Installer, attach_gpu_runtime};
use crate::archive::ArchiveExtractor;
use crate::driver::DriverAction;
use crate::manifest::resolve_version;
use crate::plan::{InstallPlan, build_install_plan};
use crate::platform::{Os, PlatformDescriptor, PlatformDetector, RawPlatform};
use crate::runtime::Runtime;

/// Platform overrides for `plan`. Anything left unset is detected on the host.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub os: Option<String>,
    pub arch: Option<String>,
    pub kernel_release: Option<String>,
    /// Also run GPU detection and driver planning
    pub drivers: bool,
}

impl PlanRequest {
    pub fn raw_platform<D: PlatformDetector>(&self, detector: &D) -> Result<RawPlatform> {
        if let (Some(os), Some(arch), Some(kernel)) = (&self.os, &self.arch, &self.kernel_release) {
            return Ok(RawPlatform {
                os_name: os.clone(),
                arch: arch.clone(),
                kernel_release: kernel.clone(),
            });
        }

        let detected = detector.detect()?;
        Ok(RawPlatform {
            os_name: self.os.clone().unwrap_or(detected.os_name),
            arch: self.arch.clone().unwrap_or(detected.arch),
            kernel_release: self
                .kernel_release
                .clone()
                .unwrap_or(detected.kernel_release),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub platform: PlatformDescriptor,
    pub plan: InstallPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverAction>,
}

impl<R: Runtime + 'static, E: ArchiveExtractor> Installer<'_, R, E> {
    #[tracing::instrument(skip(self, detector))]
    pub async fn preview<D: PlatformDetector>(
        &self,
        detector: &D,
        request: &PlanRequest,
    ) -> Result<PlanReport> {
        let raw = request.raw_platform(detector)?;
        debug!("Planning for {:?}", raw);
        let platform = raw.resolve()?;

        let version = resolve_version(self.config, &self.http).await?;
        let mut plan = build_install_plan(&platform, &version, &self.config.bucket_url)?;

        let driver = if request.drivers && platform.os == Os::Linux {
            let action = self.plan_drivers(&platform, &version);
            plan = attach_gpu_runtime(plan, &action);
            Some(action)
        } else {
            None
        };

        Ok(PlanReport {
            platform,
            plan,
            driver,
        })
    }
}
