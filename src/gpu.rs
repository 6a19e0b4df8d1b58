//! GPU vendor detection.
//!
//! `nvidia-smi` is asked first and short-circuits. Otherwise the PCI vendor
//! IDs are scanned, from `lspci -n` when available and from
//! `lshw -c display -numeric` as the heavier fallback.

use log::{debug, warn};
use serde::Serialize;

use crate::runtime::Runtime;

pub const NVIDIA_VENDOR_ID: &str = "10de";
pub const AMD_VENDOR_ID: &str = "1002";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GpuKind {
    None,
    Nvidia,
    Amd,
}

#[tracing::instrument(skip(runtime))]
pub fn detect_gpu<R: Runtime>(runtime: &R) -> GpuKind {
    if nvidia_smi_reports_device(runtime) {
        debug!("nvidia-smi reports an NVIDIA device");
        return GpuKind::Nvidia;
    }

    let kind = match run_lister(runtime, "lspci", &["-n"]) {
        Some(out) => scan_lspci(&out),
        None => run_lister(runtime, "lshw", &["-c", "display", "-numeric"])
            .map(|out| scan_lshw(&out))
            .unwrap_or(GpuKind::None),
    };

    if kind == GpuKind::None {
        warn!("No NVIDIA or AMD GPU detected");
    }
    kind
}

fn nvidia_smi_reports_device<R: Runtime>(runtime: &R) -> bool {
    run_lister(runtime, "nvidia-smi", &["-L"])
        .is_some_and(|out| out.lines().any(|line| line.trim_start().starts_with("GPU")))
}

/// Stdout of a successful run, or `None` when the tool is absent or fails.
fn run_lister<R: Runtime>(runtime: &R, program: &str, args: &[&str]) -> Option<String> {
    runtime.find_program(program)?;
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    match runtime.run_command(program, &args) {
        Ok(output) if output.success => Some(output.stdout),
        Ok(output) => {
            debug!("{} failed: {}", program, output.stderr.trim());
            None
        }
        Err(e) => {
            debug!("{} could not run: {:#}", program, e);
            None
        }
    }
}

fn vendor_kind(vendors: impl Iterator<Item = String>) -> GpuKind {
    let mut kind = GpuKind::None;
    for vendor in vendors {
        match vendor.as_str() {
            NVIDIA_VENDOR_ID => return GpuKind::Nvidia,
            AMD_VENDOR_ID => kind = GpuKind::Amd,
            _ => {}
        }
    }
    kind
}

/// `lspci -n` lines look like `01:00.0 0300: 10de:2204 (rev a1)`.
pub fn scan_lspci(output: &str) -> GpuKind {
    vendor_kind(output.lines().filter_map(|line| {
        let id = line.split_whitespace().nth(2)?;
        let (vendor, _device) = id.split_once(':')?;
        Some(vendor.to_lowercase())
    }))
}

/// `lshw -numeric` prints vendors as `NVIDIA Corporation [10DE]`.
pub fn scan_lshw(output: &str) -> GpuKind {
    vendor_kind(output.lines().filter_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        if key.trim() != "vendor" {
            return None;
        }
        let open = value.rfind('[')?;
        let close = value[open..].find(']')?;
        Some(value[open + 1..open + close].to_lowercase())
    }))
}
