//! HuggingFace model downloader
//!
//! Provides functionality to download GGUF models from HuggingFace Hub.

use crate::inference::model::select_gguf;
use crate::storage::{get_cache_dir, StorageError};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const USER_AGENT: &str = concat!("hexaslm/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Could not parse HuggingFace ID: {0}")]
    InvalidId(String),
    #[error("Invalid model filename: {0}")]
    InvalidFilename(String),
    #[error("No GGUF files found in {0}")]
    NoGgufFiles(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Download failed with status: {0}")]
    Status(reqwest::StatusCode),
    #[error("Could not determine file size")]
    UnknownSize,
    #[error("Download incomplete: got {got} bytes, expected {expected}")]
    Incomplete { got: u64, expected: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Parse a HuggingFace URL to extract model info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuggingFaceUrl {
    pub repo_id: String,
    pub filename: String,
    pub revision: String,
}

fn sanitize_local_filename(filename: &str) -> Result<String, HubError> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(HubError::InvalidFilename(filename.to_string()));
    }

    let no_query = trimmed.split('?').next().unwrap_or(trimmed);
    let no_fragment = no_query.split('#').next().unwrap_or(no_query);
    let no_leading = no_fragment.trim_start_matches('/');

    let flattened = no_leading.replace('\\', "/").replace('/', "__");

    let mut sanitized = String::with_capacity(flattened.len());
    for ch in flattened.chars() {
        let invalid = matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*');
        if invalid || ch.is_control() {
            sanitized.push('_');
        } else {
            sanitized.push(ch);
        }
    }

    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }

    if sanitized.is_empty() {
        return Err(HubError::InvalidFilename(filename.to_string()));
    }

    Ok(sanitized)
}

impl HuggingFaceUrl {
    /// Parse various HuggingFace URL formats
    pub fn parse(url: &str) -> Result<Self, HubError> {
        // Handle different URL formats:
        // 1. https://huggingface.co/username/repo/blob/main/model.gguf
        // 2. https://huggingface.co/username/repo/resolve/main/model.gguf
        // 3. username/repo/model.gguf
        // 4. username/repo

        let url = url.trim();
        let url = url.split('?').next().unwrap_or(url);
        let url = url.split('#').next().unwrap_or(url);

        if url.contains("huggingface.co") {
            let path = url
                .replace("https://huggingface.co/", "")
                .replace("http://huggingface.co/", "");

            let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            if parts.len() < 2 {
                return Err(HubError::InvalidId(url.to_string()));
            }

            let repo_id = format!("{}/{}", parts[0], parts[1]);

            if let Some(filename_pos) = parts.iter().position(|&p| p == "blob" || p == "resolve") {
                if parts.len() > filename_pos + 2 {
                    return Ok(Self {
                        repo_id,
                        filename: parts[filename_pos + 2..].join("/"),
                        revision: parts[filename_pos + 1].to_string(),
                    });
                }
            }

            return Ok(Self {
                repo_id,
                filename: String::new(),
                revision: "main".to_string(),
            });
        }

        let parts: Vec<&str> = url.split('/').collect();
        if parts.len() >= 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            let repo_id = format!("{}/{}", parts[0], parts[1]);
            let filename = if parts.len() > 2 {
                parts[2..].join("/")
            } else {
                String::new()
            };
            return Ok(Self {
                repo_id,
                filename,
                revision: "main".to_string(),
            });
        }

        Err(HubError::InvalidId(url.to_string()))
    }

    /// Build the download URL for `filename`
    pub fn download_url(&self, filename: &str) -> String {
        format!(
            "https://huggingface.co/{}/resolve/{}/{}",
            self.repo_id, self.revision, filename
        )
    }
}

/// Download a model from HuggingFace into the local cache.
///
/// When the ID names a repository only, the GGUF matching `use_4bit` is picked.
/// An already downloaded, non-empty file is reused.
pub async fn download_model(
    id: &str,
    use_4bit: bool,
    progress_callback: impl Fn(u64, u64),
) -> Result<PathBuf, HubError> {
    let hf_url = HuggingFaceUrl::parse(id)?;

    let filename = if hf_url.filename.is_empty() {
        let files = list_gguf_files(&hf_url).await?;
        select_gguf(&files, use_4bit)
            .map(str::to_string)
            .ok_or_else(|| HubError::NoGgufFiles(hf_url.repo_id.clone()))?
    } else {
        hf_url.filename.clone()
    };

    let download_url = hf_url.download_url(&filename);
    let safe_filename = sanitize_local_filename(&format!("{}/{}", hf_url.repo_id, filename))?;

    let models_dir = get_cache_dir()?.join("models");
    fs::create_dir_all(&models_dir)?;

    let output_path = models_dir.join(&safe_filename);
    let temp_path = models_dir.join(format!("{}.tmp", safe_filename));

    if output_path.exists() && fs::metadata(&output_path)?.len() > 0 {
        tracing::info!("Model already cached: {:?}", output_path);
        return Ok(output_path);
    }

    tracing::info!("Downloading from: {}", download_url);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3600)) // 1 hour timeout for large models
        .build()?;

    let mut response = client
        .get(&download_url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(HubError::Status(response.status()));
    }

    let total_size = response.content_length().ok_or(HubError::UnknownSize)?;
    tracing::info!("File size: {} bytes ({} MB)", total_size, total_size / 1024 / 1024);

    let mut temp_file = File::create(&temp_path).await?;
    let mut downloaded: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        temp_file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        progress_callback(downloaded, total_size);
    }
    temp_file.flush().await?;

    if downloaded != total_size {
        return Err(HubError::Incomplete {
            got: downloaded,
            expected: total_size,
        });
    }

    fs::rename(&temp_path, &output_path)?;
    tracing::info!("Download complete: {:?}", output_path);

    Ok(output_path)
}

/// List available GGUF files in a HuggingFace repository
async fn list_gguf_files(hf_url: &HuggingFaceUrl) -> Result<Vec<String>, HubError> {
    let api_url = format!(
        "https://huggingface.co/api/models/{}/tree/{}",
        hf_url.repo_id, hf_url.revision
    );

    let response = reqwest::Client::new()
        .get(&api_url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(HubError::Status(response.status()));
    }

    let files: Vec<FileInfo> = response.json().await?;
    Ok(files
        .into_iter()
        .filter(|f| f.path.ends_with(".gguf"))
        .map(|f| f.path)
        .collect())
}

#[derive(Debug, serde::Deserialize)]
struct FileInfo {
    path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hf_url_full() {
        let url = "https://huggingface.co/TheBloke/Llama-2-7B-GGUF/blob/main/llama-2-7b.Q4_K_M.gguf";
        let parsed = HuggingFaceUrl::parse(url).unwrap();
        assert_eq!(parsed.repo_id, "TheBloke/Llama-2-7B-GGUF");
        assert_eq!(parsed.filename, "llama-2-7b.Q4_K_M.gguf");
        assert_eq!(parsed.revision, "main");
    }

    #[test]
    fn test_parse_hf_url_resolve_revision() {
        let url = "https://huggingface.co/Qwen/Qwen2.5-7B-Instruct-GGUF/resolve/v1.0/q4.gguf?download=true";
        let parsed = HuggingFaceUrl::parse(url).unwrap();
        assert_eq!(parsed.revision, "v1.0");
        assert_eq!(parsed.filename, "q4.gguf");
        assert_eq!(
            parsed.download_url(&parsed.filename),
            "https://huggingface.co/Qwen/Qwen2.5-7B-Instruct-GGUF/resolve/v1.0/q4.gguf"
        );
    }

    #[test]
    fn test_parse_hf_url_short() {
        let url = "TheBloke/Llama-2-7B-GGUF/llama-2-7b.Q4_K_M.gguf";
        let parsed = HuggingFaceUrl::parse(url).unwrap();
        assert_eq!(parsed.repo_id, "TheBloke/Llama-2-7B-GGUF");
        assert_eq!(parsed.filename, "llama-2-7b.Q4_K_M.gguf");
    }

    #[test]
    fn test_parse_hf_url_repo_only() {
        let parsed = HuggingFaceUrl::parse("TheBloke/Llama-2-7B-GGUF").unwrap();
        assert_eq!(parsed.repo_id, "TheBloke/Llama-2-7B-GGUF");
        assert_eq!(parsed.filename, "");
    }

    #[test]
    fn test_parse_hf_url_invalid() {
        assert!(matches!(
            HuggingFaceUrl::parse("just-a-name"),
            Err(HubError::InvalidId(_))
        ));
        assert!(HuggingFaceUrl::parse("https://huggingface.co/only").is_err());
    }

    #[test]
    fn test_sanitize_local_filename() {
        assert_eq!(
            sanitize_local_filename("Qwen/Repo/sub/model:Q4.gguf").unwrap(),
            "Qwen__Repo__sub__model_Q4.gguf"
        );
        assert_eq!(sanitize_local_filename("model.gguf. ").unwrap(), "model.gguf");
        assert!(sanitize_local_filename("   ").is_err());
    }
}
