use anyhow::{Result, bail};
use log::debug;

use super::PlatformDescriptor;
use crate::runtime::Runtime;

/// Raw strings as reported by the host, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPlatform {
    pub os_name: String,
    pub arch: String,
    pub kernel_release: String,
}

impl RawPlatform {
    pub fn resolve(&self) -> Result<PlatformDescriptor> {
        PlatformDescriptor::resolve(&self.os_name, &self.arch, &self.kernel_release)
    }
}

/// Trait for platform detection (useful for testing)
#[cfg_attr(test, mockall::automock)]
pub trait PlatformDetector: Send + Sync {
    fn detect(&self) -> Result<RawPlatform>;
}

/// Detects the host platform by asking `uname`.
pub struct UnameDetector<'a, R: Runtime> {
    runtime: &'a R,
}

impl<'a, R: Runtime> UnameDetector<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    fn uname(&self, flag: &str) -> Result<String> {
        let output = self.runtime.run_command("uname", &[flag.to_string()])?;
        if !output.success {
            bail!("uname {} failed: {}", flag, output.stderr.trim());
        }
        Ok(output.stdout.trim().to_string())
    }
}

impl<R: Runtime> PlatformDetector for UnameDetector<'_, R> {
    #[tracing::instrument(skip(self))]
    fn detect(&self) -> Result<RawPlatform> {
        let raw = RawPlatform {
            os_name: self.uname("-s")?,
            arch: self.uname("-m")?,
            kernel_release: self.uname("-r")?,
        };
        debug!("Detected raw platform: {:?}", raw);
        Ok(raw)
    }
}
