use assert_cmd::Command;
use assert_cmd::cargo;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use std::io::prelude::*;
use tar::{Builder, EntryType};

fn kuzco_install() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("kuzco-install"));
    for var in ["CLI_VERSION", "DEBUG_MODE", "HIP_PATH", "ROCM_PATH", "KUZCO_BASE_URL"] {
        cmd.env_remove(var);
    }
    cmd
}

fn create_tar_gz_with_links(files: &[(&str, &str)], links: &[(&str, &str)]) -> Vec<u8> {
    let mut tar_builder = Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_path(name).unwrap();
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder.append(&header, content.as_bytes()).unwrap();
    }
    for (name, target) in links {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        tar_builder.append_link(&mut header, name, target).unwrap();
    }
    let tar = tar_builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_plan_unsupported_arch_exits_1() {
    kuzco_install()
        .args(["plan", "--os", "Linux", "--arch", "riscv64"])
        .args(["--kernel-release", "6.5.0", "--cli-version", "1.0.0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("riscv64"));
}

#[test]
fn test_plan_unsupported_os_exits_1() {
    kuzco_install()
        .args(["plan", "--os", "FreeBSD", "--arch", "x86_64"])
        .args(["--kernel-release", "14.0", "--cli-version", "1.0.0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("FreeBSD"));
}

#[test]
fn test_plan_reads_latest_version_from_manifest() {
    let mut server = Server::new();
    let manifest = server
        .mock("GET", "/cli-versions.json")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"cli-latest":"2.0.0","other":"x"}"#)
        .create();

    kuzco_install()
        .env("BUCKET_URL", server.url())
        .args(["plan", "--os", "Linux", "--arch", "x86_64", "--kernel-release", "6.5.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": \"2.0.0\""))
        .stdout(predicate::str::contains("/cli/release/amd64/kuzco-linux-amd64-2.0.0"))
        .stdout(predicate::str::contains(
            "/cli/runtime/amd64/kuzco-linux-amd64-lib-2.0.0.tar.gz",
        ));

    manifest.assert();
}

#[test]
fn test_plan_invalid_manifest_fails() {
    let mut server = Server::new();
    let _manifest = server
        .mock("GET", "/cli-versions.json")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"cli-stable":"1.0.0"}"#)
        .create();

    kuzco_install()
        .env("BUCKET_URL", server.url())
        .args(["plan", "--os", "Linux", "--arch", "x86_64", "--kernel-release", "6.5.0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid version manifest"));
}

#[test]
fn test_plan_darwin_has_no_library_archive() {
    kuzco_install()
        .env("BUCKET_URL", "cfs.example.com/")
        .args(["plan", "--os", "Darwin", "--arch", "arm64", "--kernel-release", "23.1.0"])
        .args(["--cli-version", "1.2.3"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "https://cfs.example.com/cli/release/macos/kuzco-darwin-aarch64-1.2.3",
        ))
        .stdout(predicate::str::contains("\"lib_archive_url\": null"));
}

#[test]
fn test_plan_rejects_wsl1() {
    kuzco_install()
        .args(["plan", "--os", "Linux", "--arch", "x86_64"])
        .args(["--kernel-release", "4.4.0-19041-Microsoft", "--cli-version", "1.0.0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("WSL1"));
}

#[test]
fn test_version_flag() {
    kuzco_install().arg("--version").assert().success();
}

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
#[test]
fn test_end_to_end_install_into_bin_dir() {
    use std::os::unix::fs::PermissionsExt;

    let mut server = Server::new();
    let cli = server
        .mock(
            "GET",
            Matcher::Regex(r"^/cli/release/[a-z0-9]+/kuzco-linux-[a-z0-9]+-9\.9\.9$".into()),
        )
        .with_status(200)
        .with_body("cli")
        .create();
    let runtime = server
        .mock(
            "GET",
            Matcher::Regex(
                r"^/cli/runtime/[a-z0-9]+/kuzco-runtime-linux-[a-z0-9]+-9\.9\.9$".into(),
            ),
        )
        .with_status(200)
        .with_body("runtime")
        .create();
    let lib_archive = create_tar_gz_with_links(
        &[("lib/libkuzco.so.1", "not really elf"), ("lib/README", "docs")],
        &[("lib/libkuzco.so", "libkuzco.so.1")],
    );
    let lib = server
        .mock("GET", Matcher::Regex(r"-lib-9\.9\.9\.tar\.gz$".into()))
        .with_status(200)
        .with_body(&lib_archive)
        .create();

    let bin_dir = tempfile::tempdir().unwrap();

    kuzco_install()
        .env("BUCKET_URL", server.url())
        .args(["install", "--skip-drivers", "--cli-version", "9.9.9", "--bin-dir"])
        .arg(bin_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("installed kuzco 9.9.9"));

    cli.assert();
    runtime.assert();
    lib.assert();

    let kuzco = bin_dir.path().join("kuzco");
    assert_eq!(std::fs::read_to_string(&kuzco).unwrap(), "cli");
    assert_eq!(
        std::fs::metadata(&kuzco).unwrap().permissions().mode() & 0o777,
        0o755
    );
    assert_eq!(
        std::fs::read_to_string(bin_dir.path().join("kuzco-runtime")).unwrap(),
        "runtime"
    );

    let library = bin_dir.path().join("libkuzco.so.1");
    assert_eq!(
        std::fs::metadata(&library).unwrap().permissions().mode() & 0o777,
        0o644
    );
    let link = bin_dir.path().join("libkuzco.so");
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        std::path::Path::new("libkuzco.so.1")
    );
    assert!(!bin_dir.path().join("README").exists());
}

#[cfg(any(target_os = "linux", all(target_os = "macos", target_arch = "aarch64")))]
#[test]
fn test_install_missing_binary_fails() {
    let mut server = Server::new();
    let _missing = server
        .mock("GET", Matcher::Any)
        .with_status(404)
        .create();
    let bin_dir = tempfile::tempdir().unwrap();

    kuzco_install()
        .env("BUCKET_URL", server.url())
        .args(["install", "--skip-drivers", "--cli-version", "9.9.9", "--bin-dir"])
        .arg(bin_dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Download failed"));

    assert!(!bin_dir.path().join("kuzco").exists());
}

#[cfg(any(target_os = "linux", all(target_os = "macos", target_arch = "aarch64")))]
#[test]
fn test_failed_install_removes_work_dir() {
    let mut server = Server::new();
    let _cli = server
        .mock(
            "GET",
            Matcher::Regex(r"^/cli/release/[a-z0-9]+/kuzco-[a-z0-9-]+-9\.9\.9$".into()),
        )
        .with_status(200)
        .with_body("cli")
        .create();
    let _runtime = server
        .mock("GET", Matcher::Regex(r"^/cli/runtime/[a-z0-9]+/kuzco-runtime-".into()))
        .with_status(404)
        .create();
    let tmp = tempfile::tempdir().unwrap();
    let bin_dir = tempfile::tempdir().unwrap();

    kuzco_install()
        .env("BUCKET_URL", server.url())
        .env("TMPDIR", tmp.path())
        .args(["install", "--skip-drivers", "--cli-version", "9.9.9", "--bin-dir"])
        .arg(bin_dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Download failed"));

    let leftover: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
    assert!(leftover.is_empty(), "work dir left behind: {:?}", leftover);
}
