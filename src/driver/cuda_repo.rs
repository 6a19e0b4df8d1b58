//! NVIDIA CUDA repository lookup keyed by distribution id and version.

use serde::Serialize;

use crate::platform::Arch;

pub const CUDA_REPO_BASE: &str = "https://developer.download.nvidia.com/compute/cuda/repos";
pub const CUDA_KEYRING_PACKAGE: &str = "cuda-keyring_1.1-1_all.deb";

/// Newest Fedora release with a published CUDA repository.
pub const FEDORA_MAX_VERSION: u32 = 37;
pub const FEDORA_MIN_VERSION: u32 = 35;

const RHEL_FAMILY: [&str; 5] = ["rhel", "centos", "rocky", "almalinux", "ol"];
const RHEL_MAJORS: [&str; 3] = ["7", "8", "9"];
const DEBIAN_VERSIONS: [&str; 3] = ["10", "11", "12"];
const UBUNTU_VERSIONS: [&str; 4] = ["18.04", "20.04", "22.04", "24.04"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepoKind {
    /// `cuda-keyring` package installed with dpkg
    AptKeyring,
    /// `.repo` file dropped into `/etc/yum.repos.d`
    YumRepoFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CudaRepo {
    /// Repository token, e.g. `ubuntu2204` or `rhel9`
    pub distro: String,
    pub url: String,
    pub kind: RepoKind,
}

/// Returns `None` for combinations NVIDIA does not publish.
pub fn cuda_repo(os_id: &str, os_version: &str, arch: Arch) -> Option<CudaRepo> {
    let repo_arch = match arch {
        Arch::Amd64 => "x86_64",
        Arch::Arm64 => "sbsa",
        Arch::DarwinAarch64 => return None,
    };
    let id = os_id.trim().to_lowercase();
    let version = os_version.trim();

    let (distro, kind) = match id.as_str() {
        id if RHEL_FAMILY.contains(&id) => {
            let major = version.split('.').next().unwrap_or_default();
            if !RHEL_MAJORS.contains(&major) {
                return None;
            }
            (format!("rhel{}", major), RepoKind::YumRepoFile)
        }
        "fedora" => {
            let release: u32 = version.parse().ok()?;
            if release < FEDORA_MIN_VERSION {
                return None;
            }
            (
                format!("fedora{}", release.min(FEDORA_MAX_VERSION)),
                RepoKind::YumRepoFile,
            )
        }
        "amzn" => (format!("fedora{}", FEDORA_MAX_VERSION), RepoKind::YumRepoFile),
        "debian" if DEBIAN_VERSIONS.contains(&version) => {
            (format!("debian{}", version), RepoKind::AptKeyring)
        }
        "ubuntu" if UBUNTU_VERSIONS.contains(&version) => {
            (format!("ubuntu{}", version.replace('.', "")), RepoKind::AptKeyring)
        }
        _ => return None,
    };

    let file = match kind {
        RepoKind::AptKeyring => CUDA_KEYRING_PACKAGE.to_string(),
        RepoKind::YumRepoFile => format!("cuda-{}.repo", distro),
    };
    let url = format!("{}/{}/{}/{}", CUDA_REPO_BASE, distro, repo_arch, file);

    Some(CudaRepo { distro, url, kind })
}
