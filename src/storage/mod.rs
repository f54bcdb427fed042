//! Persistent storage
//!
//! Settings on disk and the local cache of downloaded models.

pub mod huggingface;
pub mod settings;

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not determine a home directory")]
    NoHomeDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
}

fn project_dirs() -> Result<ProjectDirs, StorageError> {
    ProjectDirs::from("", "", "hexaslm").ok_or(StorageError::NoHomeDir)
}

/// Directory holding `settings.json`
pub fn get_config_dir() -> Result<PathBuf, StorageError> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Directory where downloaded models are kept
pub fn get_cache_dir() -> Result<PathBuf, StorageError> {
    Ok(project_dirs()?.cache_dir().to_path_buf())
}
