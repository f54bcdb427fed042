//! GPU detection
//!
//! Best-effort probe for a usable GPU and its VRAM, used to pick offload and
//! context defaults.

use std::process::Command;

/// GPU information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuInfo {
    pub name: String,
    pub vram_total_mb: u64,
    pub is_available: bool,
}

impl GpuInfo {
    fn not_detected() -> Self {
        Self {
            name: "GPU not detected".to_string(),
            vram_total_mb: 0,
            is_available: false,
        }
    }

    /// Total dedicated VRAM in GB, if a GPU with known memory was found
    pub fn vram_gb(&self) -> Option<f64> {
        if self.is_available && self.vram_total_mb > 0 {
            Some(self.vram_total_mb as f64 / 1024.0)
        } else {
            None
        }
    }
}

/// Detect available GPU (best effort)
pub fn detect_gpu() -> GpuInfo {
    #[cfg(target_os = "macos")]
    let detected = detect_gpu_macos();

    #[cfg(target_os = "windows")]
    let detected = detect_gpu_nvidia_smi().or_else(detect_gpu_wmic);

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let detected = detect_gpu_nvidia_smi();

    let info = detected.unwrap_or_else(GpuInfo::not_detected);
    tracing::debug!("GPU probe: {:?}", info);
    info
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

// =============================================================================
// NVIDIA (Linux and Windows)
// =============================================================================

#[cfg(not(target_os = "macos"))]
fn detect_gpu_nvidia_smi() -> Option<GpuInfo> {
    let stdout = run(
        "nvidia-smi",
        &["--query-gpu=name,memory.total", "--format=csv,noheader,nounits"],
    )?;
    parse_nvidia_smi(&stdout)
}

/// Parse the first line of `nvidia-smi --query-gpu=name,memory.total` CSV output
#[cfg_attr(target_os = "macos", allow(dead_code))]
fn parse_nvidia_smi(stdout: &str) -> Option<GpuInfo> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?;
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
    if parts.len() < 2 {
        return None;
    }

    Some(GpuInfo {
        name: parts[0].to_string(),
        vram_total_mb: parts[1].parse::<u64>().ok()?,
        is_available: true,
    })
}

// =============================================================================
// Windows fallback
// =============================================================================

#[cfg(target_os = "windows")]
fn detect_gpu_wmic() -> Option<GpuInfo> {
    let stdout = run(
        "wmic",
        &["path", "Win32_VideoController", "get", "Name,AdapterRAM", "/Format:List"],
    )?;

    let mut name: Option<String> = None;
    let mut adapter_ram_bytes: Option<u64> = None;

    for line in stdout.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Name=") {
            if !value.trim().is_empty() {
                name = Some(value.trim().to_string());
            }
        } else if let Some(value) = line.strip_prefix("AdapterRAM=") {
            adapter_ram_bytes = value.trim().parse::<u64>().ok();
        }

        if name.is_some() && adapter_ram_bytes.is_some() {
            break;
        }
    }

    Some(GpuInfo {
        name: name?,
        vram_total_mb: adapter_ram_bytes.unwrap_or(0) / 1024 / 1024,
        is_available: true,
    })
}

// =============================================================================
// macOS
// =============================================================================

#[cfg(target_os = "macos")]
fn detect_gpu_macos() -> Option<GpuInfo> {
    let stdout = run("system_profiler", &["SPDisplaysDataType"])?;
    let mut info = parse_system_profiler(&stdout)?;

    // Apple Silicon shares system RAM with the GPU
    if info.vram_total_mb == 0 && info.name.contains("Apple") {
        info.vram_total_mb = run("sysctl", &["-n", "hw.memsize"])
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|bytes| bytes / 1024 / 1024)
            .unwrap_or(0);
    }
    Some(info)
}

/// Parse `system_profiler SPDisplaysDataType` output
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_system_profiler(stdout: &str) -> Option<GpuInfo> {
    let mut gpu_name: Option<String> = None;
    let mut vram_mb: u64 = 0;

    for line in stdout.lines() {
        let trimmed = line.trim();

        // "Chipset Model: Apple M2 Pro"
        if let Some(name) = trimmed.strip_prefix("Chipset Model:") {
            if !name.trim().is_empty() {
                gpu_name = Some(name.trim().to_string());
            }
        }

        // "VRAM (Total): 16 GB" or "VRAM (Dynamic, Max): 4096 MB"
        if trimmed.starts_with("VRAM") {
            let after_colon = trimmed.split(':').nth(1).unwrap_or("").trim();
            let parts: Vec<&str> = after_colon.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Ok(val) = parts[0].parse::<u64>() {
                    vram_mb = match parts[1].to_uppercase().as_str() {
                        "GB" => val * 1024,
                        _ => val,
                    };
                }
            }
        }
    }

    Some(GpuInfo {
        name: format!("{} (Metal)", gpu_name?),
        vram_total_mb: vram_mb,
        is_available: true,
    })
}
