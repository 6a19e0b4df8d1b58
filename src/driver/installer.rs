//! Package-manager backed execution of driver plans.

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};

use super::cuda_repo::{CUDA_KEYRING_PACKAGE, CudaRepo, RepoKind};
use super::PackageManager;
use crate::download::download_file;
use crate::http::HttpClient;
use crate::runtime::Runtime;

pub const CUDA_DRIVER_PACKAGE: &str = "cuda-drivers";
pub const YUM_REPOS_DIR: &str = "/etc/yum.repos.d";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DriverInstaller: Send + Sync {
    /// Register the NVIDIA CUDA repository with the package manager.
    async fn install_cuda_repo(&self, repo: &CudaRepo) -> Result<()>;

    /// Install a package non-interactively.
    async fn install_package(&self, name: &str) -> Result<()>;
}

fn run_checked<R: Runtime>(runtime: &R, program: &str, args: &[&str]) -> Result<()> {
    info!("Running {} {}", program, args.join(" "));
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let output = runtime.run_command(program, &args)?;
    if !output.success {
        bail!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            output.stderr.trim()
        );
    }
    Ok(())
}

/// Debian and Ubuntu: `cuda-keyring` package plus apt-get.
pub struct AptInstaller<'a, R: Runtime> {
    runtime: &'a R,
    http: &'a HttpClient,
    work_dir: PathBuf,
}

impl<'a, R: Runtime> AptInstaller<'a, R> {
    /// `work_dir` receives the downloaded keyring package.
    pub fn new(runtime: &'a R, http: &'a HttpClient, work_dir: &Path) -> Self {
        Self {
            runtime,
            http,
            work_dir: work_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl<R: Runtime> DriverInstaller for AptInstaller<'_, R> {
    #[tracing::instrument(skip(self))]
    async fn install_cuda_repo(&self, repo: &CudaRepo) -> Result<()> {
        if repo.kind != RepoKind::AptKeyring {
            bail!("apt cannot install the {} repository", repo.distro);
        }
        let keyring = self.work_dir.join(CUDA_KEYRING_PACKAGE);
        download_file(self.runtime, &repo.url, &keyring, self.http).await?;

        let keyring = keyring.to_string_lossy().into_owned();
        run_checked(self.runtime, "dpkg", &["-i", keyring.as_str()])?;
        run_checked(self.runtime, "apt-get", &["update"])
    }

    #[tracing::instrument(skip(self))]
    async fn install_package(&self, name: &str) -> Result<()> {
        run_checked(self.runtime, "apt-get", &["install", "-y", name])
    }
}

/// RHEL family, Fedora and Amazon Linux: a `.repo` file plus dnf or yum.
pub struct YumDnfInstaller<'a, R: Runtime> {
    runtime: &'a R,
    http: &'a HttpClient,
    program: &'static str,
    repos_dir: PathBuf,
}

impl<'a, R: Runtime> YumDnfInstaller<'a, R> {
    pub fn new(runtime: &'a R, http: &'a HttpClient, package_manager: PackageManager) -> Self {
        Self {
            runtime,
            http,
            program: package_manager.program(),
            repos_dir: PathBuf::from(YUM_REPOS_DIR),
        }
    }

    #[cfg(test)]
    pub fn with_repos_dir(mut self, dir: &Path) -> Self {
        self.repos_dir = dir.to_path_buf();
        self
    }
}

#[async_trait]
impl<R: Runtime> DriverInstaller for YumDnfInstaller<'_, R> {
    #[tracing::instrument(skip(self))]
    async fn install_cuda_repo(&self, repo: &CudaRepo) -> Result<()> {
        if repo.kind != RepoKind::YumRepoFile {
            bail!("{} cannot install the {} repository", self.program, repo.distro);
        }
        let contents = self.http.get_text(&repo.url).await?;
        let path = self.repos_dir.join(format!("cuda-{}.repo", repo.distro));
        info!("Writing {:?}", path);
        self.runtime.write(&path, contents.as_bytes())?;

        run_checked(self.runtime, self.program, &["clean", "expire-cache"])
    }

    #[tracing::instrument(skip(self))]
    async fn install_package(&self, name: &str) -> Result<()> {
        run_checked(self.runtime, self.program, &["install", "-y", name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::cuda_repo;
    use crate::platform::Arch;
    use crate::runtime::{CommandOutput, MockRuntime};
    use mockall::Sequence;
    use mockall::predicate::{always, eq};
    use reqwest::Client;

    fn with_server_url(mut repo: CudaRepo, base: &str, path: &str) -> CudaRepo {
        repo.url = format!("{}{}", base, path);
        repo
    }

    #[tokio::test]
    async fn test_apt_installs_keyring_then_updates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ubuntu2204/x86_64/cuda-keyring_1.1-1_all.deb")
            .with_status(200)
            .with_body("deb")
            .create_async()
            .await;
        let repo = with_server_url(
            cuda_repo("ubuntu", "22.04", Arch::Amd64).unwrap(),
            &server.url(),
            "/ubuntu2204/x86_64/cuda-keyring_1.1-1_all.deb",
        );

        let mut runtime = MockRuntime::new();
        let mut seq = Sequence::new();
        runtime
            .expect_create_file()
            .with(eq(PathBuf::from("/tmp/work/cuda-keyring_1.1-1_all.deb")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Box::new(std::io::sink())));
        runtime
            .expect_run_command()
            .withf(|program, args| {
                program == "dpkg" && args.len() == 2 && args[0] == "-i"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::ok("")));
        runtime
            .expect_run_command()
            .withf(|program, args| program == "apt-get" && args.len() == 1 && args[0] == "update")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let http = HttpClient::new(Client::new());
        let installer = AptInstaller::new(&runtime, &http, Path::new("/tmp/work"));
        installer.install_cuda_repo(&repo).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_apt_rejects_yum_repo() {
        let runtime = MockRuntime::new();
        let http = HttpClient::new(Client::new());
        let installer = AptInstaller::new(&runtime, &http, Path::new("/tmp/work"));
        let repo = cuda_repo("rhel", "9.3", Arch::Amd64).unwrap();
        assert!(installer.install_cuda_repo(&repo).await.is_err());
    }

    #[tokio::test]
    async fn test_apt_package_failure_reports_stderr() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_run_command()
            .returning(|_, _| {
                Ok(CommandOutput::failed(
                    "E: Unable to locate package cuda-drivers",
                ))
            });

        let http = HttpClient::new(Client::new());
        let installer = AptInstaller::new(&runtime, &http, Path::new("/tmp/work"));
        let err = installer
            .install_package(CUDA_DRIVER_PACKAGE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unable to locate package"));
    }

    #[tokio::test]
    async fn test_dnf_writes_repo_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rhel9/x86_64/cuda-rhel9.repo")
            .with_status(200)
            .with_body("[cuda-rhel9-x86_64]\nname=cuda\n")
            .create_async()
            .await;
        let repo = with_server_url(
            cuda_repo("rocky", "9.3", Arch::Amd64).unwrap(),
            &server.url(),
            "/rhel9/x86_64/cuda-rhel9.repo",
        );

        let mut runtime = MockRuntime::new();
        runtime
            .expect_write()
            .with(eq(PathBuf::from("/etc/yum.repos.d/cuda-rhel9.repo")), always())
            .times(1)
            .returning(|_, contents| {
                assert!(String::from_utf8_lossy(contents).contains("[cuda-rhel9-x86_64]"));
                Ok(())
            });
        runtime
            .expect_run_command()
            .withf(|program, args| program == "dnf" && args[0] == "clean")
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));
        runtime
            .expect_run_command()
            .withf(|program, args| {
                program == "dnf" && args[0] == "install" && args[2] == CUDA_DRIVER_PACKAGE
            })
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let http = HttpClient::new(Client::new());
        let installer = YumDnfInstaller::new(&runtime, &http, PackageManager::Dnf);
        installer.install_cuda_repo(&repo).await.unwrap();
        installer.install_package(CUDA_DRIVER_PACKAGE).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_yum_uses_custom_repos_dir() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fedora37/x86_64/cuda-fedora37.repo")
            .with_status(200)
            .with_body("[cuda]")
            .create_async()
            .await;
        let repo = with_server_url(
            cuda_repo("amzn", "2", Arch::Amd64).unwrap(),
            &server.url(),
            "/fedora37/x86_64/cuda-fedora37.repo",
        );

        let mut runtime = MockRuntime::new();
        runtime
            .expect_write()
            .with(eq(PathBuf::from("/srv/repos/cuda-fedora37.repo")), always())
            .returning(|_, _| Ok(()));
        runtime
            .expect_run_command()
            .withf(|program, _| program == "yum")
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let http = HttpClient::new(Client::new());
        let installer = YumDnfInstaller::new(&runtime, &http, PackageManager::Yum)
            .with_repos_dir(Path::new("/srv/repos"));
        installer.install_cuda_repo(&repo).await.unwrap();
    }
}
