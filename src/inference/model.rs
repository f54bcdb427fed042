//! GGUF model files
//!
//! Validation of GGUF files, quantization detection from file names, and
//! resolution of a `--model-path` argument to a concrete model file.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::config::DEFAULT_MODEL_PATH;
use crate::types::model::{ModelInfo, Quantization};

/// First four bytes of every GGUF file
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model path not found: {0}")]
    NotFound(PathBuf),
    #[error("Not a GGUF file: {0}")]
    InvalidFormat(PathBuf),
    #[error("No GGUF files found in {0}")]
    NoModelFiles(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a model should be loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A GGUF file or a directory of GGUF files on disk
    Local(PathBuf),
    /// A Hugging Face repository ID or URL
    Hub(String),
}

/// Check that `path` is a readable GGUF file
pub fn validate_gguf(path: &Path) -> Result<(), ModelError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || magic != GGUF_MAGIC {
        return Err(ModelError::InvalidFormat(path.to_path_buf()));
    }
    Ok(())
}

/// Detect the quantization label in a GGUF file name.
///
/// Looks at the `-` / `.` separated segments of the stem and keeps the last
/// one that reads as a llama.cpp quantization (`Q4_K_M`, `IQ4_XS`, `F16`...).
pub fn detect_quantization(file_name: &str) -> Option<Quantization> {
    let stem = file_name
        .strip_suffix(".gguf")
        .or_else(|| file_name.strip_suffix(".GGUF"))
        .unwrap_or(file_name);

    stem.split(['-', '.'])
        .filter_map(parse_quant_segment)
        .last()
}

fn parse_quant_segment(segment: &str) -> Option<Quantization> {
    let upper = segment.to_ascii_uppercase();
    let bits = match upper.as_str() {
        "F32" | "FP32" => 32,
        "F16" | "FP16" | "BF16" => 16,
        _ => {
            let rest = upper
                .strip_prefix("IQ")
                .or_else(|| upper.strip_prefix('Q'))?;
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            let tail = &rest[digits.len()..];
            if !(tail.is_empty() || tail.starts_with('_')) {
                return None;
            }
            digits.parse().ok()?
        }
    };
    Some(Quantization { label: upper, bits })
}

/// Files in a directory listing that can be loaded on their own
fn is_loadable_gguf(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    if !lower.ends_with(".gguf") || lower.contains("mmproj") {
        return false;
    }
    // Split models are loaded from their first shard
    match lower.find("-of-") {
        Some(pos) => lower[..pos].ends_with("00001"),
        None => true,
    }
}

/// Pick the GGUF that best matches the requested precision.
///
/// The 4-bit flag targets 4 bits per weight, otherwise 16. The closest
/// candidate wins, ties go to more bits, then to the file name.
pub fn select_gguf<S: AsRef<str>>(candidates: &[S], use_4bit: bool) -> Option<&str> {
    let target: i64 = if use_4bit { 4 } else { 16 };

    candidates
        .iter()
        .map(|s| s.as_ref())
        .filter(|name| is_loadable_gguf(file_name_of(name)))
        .min_by_key(|name| {
            let quant = detect_quantization(file_name_of(name));
            match quant {
                Some(q) => (0, (q.bits as i64 - target).abs(), -(q.bits as i64), name.to_string()),
                None => (1, 0, 0, name.to_string()),
            }
        })
}

fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Decide whether a model path refers to the local disk or the Hub.
pub fn classify_source(model_path: &str) -> ModelSource {
    let path = Path::new(model_path);
    if path.exists() || model_path.contains(DEFAULT_MODEL_PATH) {
        return ModelSource::Local(path.to_path_buf());
    }

    let trimmed = model_path.trim();
    if trimmed.starts_with("https://huggingface.co/") || trimmed.starts_with("http://huggingface.co/") {
        return ModelSource::Hub(trimmed.to_string());
    }

    let looks_local = trimmed.starts_with(['.', '/', '~', '\\'])
        || trimmed.contains('\\')
        || trimmed.contains(':');
    let mut parts = trimmed.split('/');
    let first = parts.next().unwrap_or_default();
    let has_repo = parts.next().is_some_and(|p| !p.is_empty());

    if !looks_local && has_repo && !Path::new(first).is_dir() {
        ModelSource::Hub(trimmed.to_string())
    } else {
        ModelSource::Local(path.to_path_buf())
    }
}

/// Resolve a local file or directory to the GGUF file to load.
pub fn resolve_local(path: &Path, use_4bit: bool) -> Result<PathBuf, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
        validate_gguf(path)?;
        return Ok(path.to_path_buf());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    tracing::debug!("Found {} files in {:?}", names.len(), path);

    let chosen = select_gguf(&names, use_4bit)
        .ok_or_else(|| ModelError::NoModelFiles(path.to_path_buf()))?;
    let file = path.join(chosen);
    validate_gguf(&file)?;
    Ok(file)
}

/// Gather display metadata for a resolved model file
pub fn model_info(path: &Path) -> Result<ModelInfo, ModelError> {
    let size_bytes = fs::metadata(path)?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = file_name
        .strip_suffix(".gguf")
        .unwrap_or(&file_name)
        .to_string();

    Ok(ModelInfo {
        quantization: detect_quantization(&file_name),
        name,
        path: path.to_path_buf(),
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_gguf(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(b"GGUF\x03\x00\x00\x00").unwrap();
        path
    }

    #[test]
    fn test_detect_quantization() {
        let q = detect_quantization("qwen2.5-7b-instruct-q4_k_m.gguf").unwrap();
        assert_eq!(q.label, "Q4_K_M");
        assert_eq!(q.bits, 4);

        let q = detect_quantization("Llama-3.2-3B.Q8_0.gguf").unwrap();
        assert_eq!((q.label.as_str(), q.bits), ("Q8_0", 8));

        let q = detect_quantization("model-IQ4_XS.gguf").unwrap();
        assert_eq!(q.bits, 4);

        let q = detect_quantization("cove-cybersec-BF16.gguf").unwrap();
        assert_eq!(q.bits, 16);

        assert!(detect_quantization("qwen2-model.gguf").is_none());
    }

    #[test]
    fn test_select_prefers_4bit() {
        let files = [
            "model-F16.gguf",
            "model-Q8_0.gguf",
            "model-Q4_K_M.gguf",
            "model-Q3_K_S.gguf",
        ];
        assert_eq!(select_gguf(&files, true), Some("model-Q4_K_M.gguf"));
        assert_eq!(select_gguf(&files, false), Some("model-F16.gguf"));
    }

    #[test]
    fn test_select_tie_prefers_more_bits() {
        let files = ["model-Q3_K_M.gguf", "model-Q5_K_M.gguf"];
        assert_eq!(select_gguf(&files, true), Some("model-Q5_K_M.gguf"));
    }

    #[test]
    fn test_select_skips_projectors_and_shards() {
        let files = [
            "mmproj-model-Q4_0.gguf",
            "model-Q4_K_M-00002-of-00002.gguf",
            "model-Q4_K_M-00001-of-00002.gguf",
            "README.md",
        ];
        assert_eq!(
            select_gguf(&files, true),
            Some("model-Q4_K_M-00001-of-00002.gguf")
        );
    }

    #[test]
    fn test_select_unlabelled_last() {
        let files = ["plain.gguf", "model-F32.gguf"];
        assert_eq!(select_gguf(&files, true), Some("model-F32.gguf"));
        let only = ["plain.gguf"];
        assert_eq!(select_gguf(&only, true), Some("plain.gguf"));
        let none: [&str; 0] = [];
        assert_eq!(select_gguf(&none, true), None);
    }

    #[test]
    fn test_validate_gguf() {
        let dir = TempDir::new().unwrap();
        let good = write_gguf(dir.path(), "good.gguf");
        assert!(validate_gguf(&good).is_ok());

        let bad = dir.path().join("bad.gguf");
        fs::write(&bad, b"PK\x03\x04").unwrap();
        assert!(matches!(validate_gguf(&bad), Err(ModelError::InvalidFormat(_))));

        let short = dir.path().join("short.gguf");
        fs::write(&short, b"GG").unwrap();
        assert!(matches!(validate_gguf(&short), Err(ModelError::InvalidFormat(_))));
    }

    #[test]
    fn test_resolve_local_directory() {
        let dir = TempDir::new().unwrap();
        write_gguf(dir.path(), "cove-Q4_K_M.gguf");
        write_gguf(dir.path(), "cove-F16.gguf");

        let four = resolve_local(dir.path(), true).unwrap();
        assert!(four.ends_with("cove-Q4_K_M.gguf"));
        let full = resolve_local(dir.path(), false).unwrap();
        assert!(full.ends_with("cove-F16.gguf"));
    }

    #[test]
    fn test_resolve_local_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_local(dir.path(), true),
            Err(ModelError::NoModelFiles(_))
        ));
        assert!(matches!(
            resolve_local(&dir.path().join("missing"), true),
            Err(ModelError::NotFound(_))
        ));
    }

    #[test]
    fn test_classify_source() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().to_string_lossy().into_owned();
        assert_eq!(classify_source(&local), ModelSource::Local(dir.path().to_path_buf()));

        assert_eq!(
            classify_source("https://huggingface.co/Qwen/Qwen2.5-7B-Instruct-GGUF"),
            ModelSource::Hub("https://huggingface.co/Qwen/Qwen2.5-7B-Instruct-GGUF".into())
        );
        assert_eq!(
            classify_source("Qwen/Qwen2.5-7B-Instruct-GGUF"),
            ModelSource::Hub("Qwen/Qwen2.5-7B-Instruct-GGUF".into())
        );
        assert!(matches!(classify_source("./missing/model.gguf"), ModelSource::Local(_)));
        assert!(matches!(classify_source("model.gguf"), ModelSource::Local(_)));
        assert!(matches!(
            classify_source("models/cove_cybersec_lora"),
            ModelSource::Local(_)
        ));
    }

    #[test]
    fn test_model_info() {
        let dir = TempDir::new().unwrap();
        let path = write_gguf(dir.path(), "cove-Q4_K_M.gguf");
        let info = model_info(&path).unwrap();
        assert_eq!(info.name, "cove-Q4_K_M");
        assert_eq!(info.size_bytes, 8);
        assert_eq!(info.quantization.map(|q| q.bits), Some(4));
    }
}
