//! Model provider seam
//!
//! The chat loop only talks to these traits, so any backend (or a test stub)
//! can stand in for llama.cpp.

use crate::inference::engine::{EngineError, GenerationParams};
use crate::inference::streaming::Streamer;
use crate::types::message::Message;
use crate::types::model::ModelInfo;

/// Model vocabulary id
pub type TokenId = i32;

/// A loaded model together with its tokenizer.
pub trait ChatModel {
    /// Render a conversation into a single prompt, ending with the assistant turn header.
    fn apply_chat_template(&self, messages: &[Message]) -> Result<String, EngineError>;

    fn encode(&self, text: &str) -> Result<Vec<TokenId>, EngineError>;

    /// Run generation on `prompt`.
    ///
    /// Returns the prompt tokens followed by the newly generated ones. New
    /// text is pushed to `streamer` as it is produced.
    fn generate(
        &self,
        prompt: &[TokenId],
        params: &GenerationParams,
        streamer: &mut dyn Streamer,
    ) -> Result<Vec<TokenId>, EngineError>;

    /// Decode tokens to text, skipping special tokens.
    fn decode(&self, tokens: &[TokenId]) -> Result<String, EngineError>;

    /// Metadata about the loaded weights, if known
    fn model_info(&self) -> Option<&ModelInfo> {
        None
    }
}

/// What to load and how
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub model_path: String,
    pub use_4bit: bool,
    /// Layers offloaded to the GPU (0 = CPU only)
    pub gpu_layers: u32,
    pub context_size: u32,
}

/// Progress events emitted while a model is being prepared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProgress {
    Downloading { downloaded: u64, total: u64 },
    Loading(String),
}

/// Produces ready-to-use models
pub trait ModelProvider {
    type Model: ChatModel;

    fn load(
        &self,
        request: &LoadRequest,
        progress: &dyn Fn(LoadProgress),
    ) -> Result<Self::Model, EngineError>;
}
