//! Immutable run configuration, read once from the environment at startup.

use log::debug;
use std::path::PathBuf;

use crate::runtime::Runtime;

pub const DEFAULT_BASE_URL: &str = "kuzco.xyz";
pub const DEFAULT_ROCM_PATH: &str = "/opt/rocm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host the other URLs derive from (`KUZCO_BASE_URL`)
    pub base_url: String,
    /// Artifact bucket (`BUCKET_URL`)
    pub bucket_url: String,
    /// Web app shown after install (`WEB_URL`)
    pub web_url: String,
    /// API endpoint shown after install (`API_URL`)
    pub api_url: String,
    /// Pinned version; skips the manifest (`CLI_VERSION`)
    pub cli_version: Option<String>,
    /// Verbose logging (`DEBUG_MODE`)
    pub debug: bool,
    pub hip_path: Option<PathBuf>,
    pub rocm_path: Option<PathBuf>,
}

impl Config {
    /// Read all settings from the runtime environment. Empty values count as unset.
    #[tracing::instrument(skip(runtime))]
    pub fn from_env<R: Runtime>(runtime: &R) -> Self {
        let var = |key: &str| runtime.env_var(key).ok().filter(|v| !v.trim().is_empty());

        let base_url = var("KUZCO_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let host = strip_scheme(&base_url).trim_end_matches('/').to_string();

        let config = Self {
            bucket_url: normalize_url(
                &var("BUCKET_URL").unwrap_or_else(|| format!("https://cfs.{}", host)),
            ),
            web_url: normalize_url(
                &var("WEB_URL").unwrap_or_else(|| format!("https://app.{}", host)),
            ),
            api_url: normalize_url(
                &var("API_URL").unwrap_or_else(|| format!("https://relay.{}", host)),
            ),
            cli_version: var("CLI_VERSION").map(|v| v.trim().to_string()),
            debug: var("DEBUG_MODE").is_some_and(|v| is_truthy(&v)),
            hip_path: var("HIP_PATH").map(PathBuf::from),
            rocm_path: var("ROCM_PATH").map(PathBuf::from),
            base_url,
        };
        debug!("Loaded configuration: {:?}", config);
        config
    }

    /// Apply a version pinned on the command line.
    pub fn with_cli_version(mut self, version: Option<String>) -> Self {
        if version.is_some() {
            self.cli_version = version;
        }
        self
    }

    /// Directory a downloaded ROCm bundle is extracted into.
    pub fn rocm_install_dir(&self) -> PathBuf {
        self.rocm_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROCM_PATH))
    }
}

/// `1`, `true`, `yes` and `on` in any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Add `https://` when no scheme is given and drop trailing slashes.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}
