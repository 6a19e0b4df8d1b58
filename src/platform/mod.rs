//! Platform resolution.
//!
//! Turns the raw kernel name, machine architecture and kernel release
//! reported by the host into a canonical [`PlatformDescriptor`]. Every
//! unsupported input maps to an [`InstallError`], never to a default.

mod detection;

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use crate::error::InstallError;

pub use detection::{PlatformDetector, RawPlatform, UnameDetector};
#[cfg(test)]
pub use detection::MockPlatformDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Os {
    Linux,
    Darwin,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Linux => write!(f, "Linux"),
            Os::Darwin => write!(f, "Darwin"),
        }
    }
}

/// Canonical architecture token used in artifact paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Arch {
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "darwin-aarch64")]
    DarwinAarch64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::DarwinAarch64 => "darwin-aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KernelVariant {
    Native,
    Wsl2,
    Wsl1Unsupported,
}

/// Resolved install target. Immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformDescriptor {
    pub os: Os,
    pub arch_raw: String,
    pub arch: Arch,
    /// Present on Linux only.
    pub kernel: Option<KernelVariant>,
}

impl PlatformDescriptor {
    /// Resolve OS, then architecture, then (on Linux) the kernel variant.
    #[tracing::instrument]
    pub fn resolve(os_name: &str, arch_raw: &str, kernel_release: &str) -> Result<Self> {
        let os = resolve_os(os_name)?;
        let arch = resolve_arch(os, arch_raw)?;

        let kernel = match os {
            Os::Linux => match classify_kernel(kernel_release) {
                KernelVariant::Wsl1Unsupported => {
                    return Err(InstallError::Wsl1Unsupported(kernel_release.to_string()).into());
                }
                variant => Some(variant),
            },
            Os::Darwin => None,
        };

        Ok(Self {
            os,
            arch_raw: arch_raw.to_string(),
            arch,
            kernel,
        })
    }

    pub fn is_wsl2(&self) -> bool {
        self.kernel == Some(KernelVariant::Wsl2)
    }
}

/// Accepts exactly `Linux` or `Darwin`, as reported by `uname -s`.
pub fn resolve_os(name: &str) -> Result<Os, InstallError> {
    match name {
        "Linux" => Ok(Os::Linux),
        "Darwin" => Ok(Os::Darwin),
        other => Err(InstallError::UnsupportedOs(other.to_string())),
    }
}

pub fn resolve_arch(os: Os, arch_raw: &str) -> Result<Arch, InstallError> {
    match (arch_raw, os) {
        ("x86_64", _) => Ok(Arch::Amd64),
        ("aarch64" | "arm64", Os::Darwin) => Ok(Arch::DarwinAarch64),
        ("aarch64" | "arm64", Os::Linux) => Ok(Arch::Arm64),
        (other, _) => Err(InstallError::UnsupportedArch(other.to_string())),
    }
}

/// Classify a Linux kernel release string. Matching is case-insensitive.
pub fn classify_kernel(release: &str) -> KernelVariant {
    let release = release.to_lowercase();
    if !release.contains("microsoft") {
        KernelVariant::Native
    } else if release.contains("wsl2") {
        KernelVariant::Wsl2
    } else {
        KernelVariant::Wsl1Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_arch_table() {
        let cases = [
            (Os::Linux, "x86_64", Arch::Amd64),
            (Os::Darwin, "x86_64", Arch::Amd64),
            (Os::Linux, "aarch64", Arch::Arm64),
            (Os::Linux, "arm64", Arch::Arm64),
            (Os::Darwin, "aarch64", Arch::DarwinAarch64),
            (Os::Darwin, "arm64", Arch::DarwinAarch64),
        ];
        for (os, raw, expected) in cases {
            assert_eq!(resolve_arch(os, raw).unwrap(), expected, "{} {}", os, raw);
        }
    }

    #[test]
    fn test_resolve_arch_rejects_unknown() {
        for raw in ["riscv64", "i686", "armv7l", "", "X86_64"] {
            for os in [Os::Linux, Os::Darwin] {
                assert_eq!(
                    resolve_arch(os, raw),
                    Err(InstallError::UnsupportedArch(raw.to_string()))
                );
            }
        }
    }

    #[test]
    fn test_resolve_os() {
        assert_eq!(resolve_os("Linux").unwrap(), Os::Linux);
        assert_eq!(resolve_os("Darwin").unwrap(), Os::Darwin);
        assert_eq!(
            resolve_os("Windows"),
            Err(InstallError::UnsupportedOs("Windows".to_string()))
        );
        assert!(resolve_os("linux").is_err());
    }

    #[test]
    fn test_classify_kernel() {
        assert_eq!(
            classify_kernel("5.15.90.1-microsoft-standard-WSL2"),
            KernelVariant::Wsl2
        );
        assert_eq!(
            classify_kernel("5.10.16.3-Microsoft-Standard-wsl2"),
            KernelVariant::Wsl2
        );
        assert_eq!(
            classify_kernel("4.4.0-19041-Microsoft"),
            KernelVariant::Wsl1Unsupported
        );
        assert_eq!(classify_kernel("6.5.0-35-generic"), KernelVariant::Native);
    }

    #[test]
    fn test_resolve_linux_descriptor() {
        let platform =
            PlatformDescriptor::resolve("Linux", "x86_64", "5.15.90.1-microsoft-standard-WSL2")
                .unwrap();
        assert_eq!(platform.os, Os::Linux);
        assert_eq!(platform.arch, Arch::Amd64);
        assert_eq!(platform.arch_raw, "x86_64");
        assert!(platform.is_wsl2());
    }

    #[test]
    fn test_resolve_darwin_has_no_kernel_variant() {
        let platform = PlatformDescriptor::resolve("Darwin", "arm64", "23.4.0").unwrap();
        assert_eq!(platform.arch, Arch::DarwinAarch64);
        assert_eq!(platform.kernel, None);
    }

    #[test]
    fn test_resolve_rejects_wsl1() {
        let err = PlatformDescriptor::resolve("Linux", "x86_64", "4.4.0-19041-Microsoft")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::Wsl1Unsupported(_))
        ));
    }

    #[test]
    fn test_resolve_checks_os_before_arch() {
        let err = PlatformDescriptor::resolve("Windows", "riscv64", "").unwrap_err();
        assert_eq!(
            err.downcast_ref::<InstallError>(),
            Some(&InstallError::UnsupportedOs("Windows".to_string()))
        );
    }
}
