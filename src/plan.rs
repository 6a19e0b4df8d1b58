//! Install plan: which artifacts to fetch for a resolved platform and version.

use serde::Serialize;

use crate::config::normalize_url;
use crate::error::InstallError;
use crate::platform::{Arch, Os, PlatformDescriptor};

pub const CLI_BINARY_NAME: &str = "kuzco";
pub const RUNTIME_BINARY_NAME: &str = "kuzco-runtime";

/// A single executable to download and the file name it is installed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub url: String,
    pub install_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    pub version: String,
    pub binary_url: String,
    pub runtime_url: String,
    /// Linux only
    pub lib_archive_url: Option<String>,
    /// AMD ROCm hosts only
    pub gpu_runtime_url: Option<String>,
}

impl InstallPlan {
    /// Executables in install order.
    pub fn binaries(&self) -> Vec<Artifact> {
        vec![
            Artifact {
                url: self.binary_url.clone(),
                install_name: CLI_BINARY_NAME,
            },
            Artifact {
                url: self.runtime_url.clone(),
                install_name: RUNTIME_BINARY_NAME,
            },
        ]
    }

    /// Every URL the plan fetches.
    #[cfg(test)]
    pub fn urls(&self) -> Vec<&str> {
        [
            Some(self.binary_url.as_str()),
            Some(self.runtime_url.as_str()),
            self.lib_archive_url.as_deref(),
            self.gpu_runtime_url.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Attach the ROCm bundle selected by driver planning.
    pub fn with_gpu_runtime(mut self, url: String) -> Self {
        self.gpu_runtime_url = Some(url);
        self
    }
}

pub fn build_install_plan(
    platform: &PlatformDescriptor,
    version: &str,
    bucket_url: &str,
) -> Result<InstallPlan, InstallError> {
    let bucket = normalize_url(bucket_url);

    match (platform.os, platform.arch) {
        (Os::Linux, arch @ (Arch::Amd64 | Arch::Arm64)) => Ok(InstallPlan {
            version: version.to_string(),
            binary_url: format!(
                "{bucket}/cli/release/{arch}/kuzco-linux-{arch}-{version}"
            ),
            runtime_url: format!(
                "{bucket}/cli/runtime/{arch}/kuzco-runtime-linux-{arch}-{version}"
            ),
            lib_archive_url: Some(format!(
                "{bucket}/cli/runtime/{arch}/kuzco-linux-{arch}-lib-{version}.tar.gz"
            )),
            gpu_runtime_url: None,
        }),
        (Os::Darwin, Arch::DarwinAarch64) => Ok(InstallPlan {
            version: version.to_string(),
            binary_url: format!("{bucket}/cli/release/macos/kuzco-darwin-aarch64-{version}"),
            runtime_url: format!(
                "{bucket}/cli/runtime/macos/kuzco-runtime-darwin-aarch64-{version}"
            ),
            lib_archive_url: None,
            gpu_runtime_url: None,
        }),
        (os, arch) => Err(InstallError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

/// Location of the ROCm runtime bundle for Linux hosts with AMD GPUs.
pub fn rocm_runtime_url(bucket_url: &str, arch: Arch, version: &str) -> String {
    let bucket = normalize_url(bucket_url);
    format!("{bucket}/cli/runtime/{arch}/kuzco-rocm-linux-{arch}-{version}.tar.gz")
}
