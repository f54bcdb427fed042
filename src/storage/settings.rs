//! Settings storage
//!
//! Generation and hardware defaults, read from `settings.json` in the config directory.

use crate::inference::GenerationParams;
use crate::storage::{get_config_dir, StorageError};
use crate::system::gpu::GpuInfo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Layer count that offloads every layer of any common model
const ALL_GPU_LAYERS: u32 = 99;

const MIN_CONTEXT_SIZE: u32 = 512;
const MAX_CONTEXT_SIZE: u32 = 131072;

/// Inference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Maximum number of new tokens per reply
    pub max_new_tokens: u32,
    /// Context window size
    pub context_size: u32,
    /// Temperature parameter for text generation (0.0 - 2.0, 0 = greedy)
    pub temperature: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Penalty applied to recently generated tokens
    pub repeat_penalty: f32,
    /// Sampler seed
    pub seed: u32,
    /// Number of GPU layers to offload (None = decide from the detected hardware)
    pub gpu_layers: Option<u32>,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            max_new_tokens: params.max_new_tokens,
            context_size: 2048,
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            repeat_penalty: params.repeat_penalty,
            seed: params.seed,
            gpu_layers: None,
        }
    }
}

impl InferenceSettings {
    /// Validate settings values
    ///
    /// Ensures all parameters are within acceptable ranges and that the
    /// context fits the VRAM of `gpu` when the KV cache is offloaded to it.
    pub fn validate(&mut self, gpu: &GpuInfo) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.top_k == 0 {
            self.top_k = 40;
        }
        if !(self.repeat_penalty > 0.0) {
            self.repeat_penalty = 1.0;
        }

        self.context_size = self.context_size.clamp(MIN_CONTEXT_SIZE, MAX_CONTEXT_SIZE);
        let offloading = gpu_backend_compiled() && self.gpu_layers != Some(0);
        if let Some(max_safe_context) = vram_context_limit(gpu, offloading) {
            if self.context_size > max_safe_context {
                tracing::warn!(
                    "Context size {} too large for available VRAM, capping to {}",
                    self.context_size,
                    max_safe_context
                );
                self.context_size = max_safe_context;
            }
        }

        self.max_new_tokens = self.max_new_tokens.max(1);
        if self.max_new_tokens > self.context_size / 2 {
            self.max_new_tokens = self.context_size / 2;
        }
    }

    /// Per-request generation parameters
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            seed: self.seed,
        }
    }

    /// GPU layers to offload, falling back to `gpu` when unset
    pub fn resolved_gpu_layers(&self, gpu: &GpuInfo) -> u32 {
        match self.gpu_layers {
            Some(layers) => layers,
            None if gpu_backend_compiled() && gpu.is_available => ALL_GPU_LAYERS,
            None => 0,
        }
    }
}

/// Whether llama.cpp was built with a GPU backend
fn gpu_backend_compiled() -> bool {
    cfg!(any(feature = "cuda", feature = "vulkan", feature = "metal"))
}

/// VRAM-based context cap; only applies when the KV cache lives on the GPU
fn vram_context_limit(gpu: &GpuInfo, offloading: bool) -> Option<u32> {
    if !offloading {
        return None;
    }
    gpu.vram_gb().map(vram_safe_context_size)
}

/// Estimate the maximum safe context size for the given VRAM.
/// Keeps the KV cache from spilling into shared GPU memory, which is slow.
fn vram_safe_context_size(vram_gb: f64) -> u32 {
    // Heuristic: half the VRAM for weights, half for KV cache at ~128 MB per 1K tokens
    let vram_for_kv = vram_gb * 0.5;
    let max_ctx = (vram_for_kv * 1024.0 / 128.0) as u32 * 1024;

    let sizes = [131072, 65536, 32768, 16384, 8192, 4096, 2048];
    for &s in &sizes {
        if s <= max_ctx {
            tracing::info!("VRAM: {:.1} GB -> max safe context: {}K", vram_gb, s / 1024);
            return s;
        }
    }

    2048
}

/// Default settings file path
pub fn default_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_config_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings(path: &Path, gpu: &GpuInfo) -> InferenceSettings {
    match load_settings_internal(path, gpu) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            let mut settings = InferenceSettings::default();
            settings.validate(gpu);
            settings
        }
    }
}

/// Internal settings loading with error propagation
fn load_settings_internal(path: &Path, gpu: &GpuInfo) -> Result<InferenceSettings, StorageError> {
    let mut settings = if path.exists() {
        let json = fs::read_to_string(path)?;
        tracing::debug!("Loaded settings from {:?}", path);
        serde_json::from_str(&json)?
    } else {
        tracing::info!("Settings file not found, using defaults");
        InferenceSettings::default()
    };

    settings.validate(gpu);
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(path: &Path, settings: &InferenceSettings) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = InferenceSettings::default();
        assert_eq!(settings.max_new_tokens, 512);
        assert_eq!(settings.context_size, 2048);
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.top_k, 40);
        assert!(settings.gpu_layers.is_none());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = InferenceSettings::default();

        settings.temperature = 5.0;
        settings.validate(&GpuInfo::default());
        assert_eq!(settings.temperature, 2.0);

        settings.temperature = -1.0;
        settings.validate(&GpuInfo::default());
        assert_eq!(settings.temperature, 0.0);

        settings.top_p = 2.0;
        settings.top_k = 0;
        settings.validate(&GpuInfo::default());
        assert_eq!(settings.top_p, 1.0);
        assert_eq!(settings.top_k, 40);

        settings.context_size = 16;
        settings.max_new_tokens = 0;
        settings.validate(&GpuInfo::default());
        assert_eq!(settings.context_size, MIN_CONTEXT_SIZE);
        assert_eq!(settings.max_new_tokens, 1);

        settings.max_new_tokens = 100_000;
        settings.validate(&GpuInfo::default());
        assert_eq!(settings.max_new_tokens, settings.context_size / 2);
    }

    #[test]
    fn test_vram_safe_context_size() {
        assert_eq!(vram_safe_context_size(8.0), 32768);
        assert_eq!(vram_safe_context_size(0.1), 2048);
    }

    #[test]
    fn test_explicit_gpu_layers() {
        let settings = InferenceSettings {
            gpu_layers: Some(12),
            ..Default::default()
        };
        assert_eq!(settings.resolved_gpu_layers(&small_gpu()), 12);
        assert_eq!(InferenceSettings::default().resolved_gpu_layers(&GpuInfo::default()), 0);
    }

    fn small_gpu() -> GpuInfo {
        GpuInfo {
            name: "Small GPU".to_string(),
            vram_total_mb: 1024,
            is_available: true,
        }
    }

    #[test]
    fn test_vram_limit_only_when_offloading() {
        assert_eq!(vram_context_limit(&small_gpu(), false), None);
        assert_eq!(vram_context_limit(&small_gpu(), true), Some(4096));
        assert_eq!(vram_context_limit(&GpuInfo::default(), true), None);
    }

    #[test]
    fn test_cpu_only_context_not_capped_by_vram() {
        let mut settings = InferenceSettings {
            context_size: 8192,
            gpu_layers: Some(0),
            ..Default::default()
        };
        settings.validate(&small_gpu());
        assert_eq!(settings.context_size, 8192);
    }

    #[test]
    fn test_generation_params_follow_settings() {
        let settings = InferenceSettings {
            max_new_tokens: 64,
            temperature: 0.0,
            ..Default::default()
        };
        let params = settings.generation_params();
        assert_eq!(params.max_new_tokens, 64);
        assert_eq!(params.temperature, 0.0);
    }

    #[test]
    fn test_settings_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = InferenceSettings {
            max_new_tokens: 256,
            gpu_layers: Some(0),
            ..Default::default()
        };
        save_settings(&path, &settings).unwrap();

        let loaded = load_settings(&path, &GpuInfo::default());
        assert_eq!(loaded.max_new_tokens, 256);
        assert_eq!(loaded.gpu_layers, Some(0));
    }

    #[test]
    fn test_partial_and_corrupt_files() {
        let dir = TempDir::new().unwrap();

        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{"max_new_tokens": 128}"#).unwrap();
        let loaded = load_settings(&partial, &GpuInfo::default());
        assert_eq!(loaded.max_new_tokens, 128);
        assert_eq!(loaded.top_k, 40);

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "not json").unwrap();
        assert_eq!(load_settings(&corrupt, &GpuInfo::default()).max_new_tokens, 512);

        let missing = dir.path().join("missing.json");
        assert_eq!(load_settings(&missing, &GpuInfo::default()).max_new_tokens, 512);
    }
}
