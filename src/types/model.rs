//! Model types
//!
//! Defines model metadata structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quantization level detected from a GGUF file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantization {
    /// Label as written in the file name, upper-cased (e.g. `Q4_K_M`)
    pub label: String,
    /// Bits per weight of the main tensors
    pub bits: u32,
}

/// Information about a loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Display name of the model
    pub name: String,
    /// Path to the GGUF file
    pub path: PathBuf,
    /// Model size in bytes
    pub size_bytes: u64,
    /// Quantization, if it could be read from the file name
    pub quantization: Option<Quantization>,
}

impl ModelInfo {
    /// One-line summary for the terminal, e.g. `qwen2.5-7b (Q4_K_M, 4.36 GB)`
    pub fn summary(&self) -> String {
        match &self.quantization {
            Some(q) => format!("{} ({}, {})", self.name, q.label, format_size(self.size_bytes)),
            None => format!("{} ({})", self.name, format_size(self.size_bytes)),
        }
    }
}

/// Get a human-readable size string
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{} B", bytes as u64)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}
