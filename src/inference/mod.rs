//! LLM inference engine
//!
//! This module handles all interaction with llama-cpp for model loading and inference.

pub mod engine;
pub mod model;
pub mod provider;
pub mod streaming;

// Re-export main types for convenience
pub use engine::{EngineError, GenerationParams, LlamaEngine, LlamaProvider};
pub use model::{validate_gguf, ModelError, ModelSource, GGUF_MAGIC};
pub use provider::{ChatModel, LoadProgress, LoadRequest, ModelProvider, TokenId};
pub use streaming::{StreamToken, Streamer, TextStreamer};
