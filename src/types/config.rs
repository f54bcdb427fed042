//! Configuration types
//!
//! Session configuration fixed for the lifetime of a chat.

use serde::{Deserialize, Serialize};

/// Local adapter directory used when no model path is given
pub const DEFAULT_MODEL_PATH: &str = "models/cove_cybersec_lora";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a cybersecurity expert assistant.";

/// System prompt that replaces the configured one in verification mode
pub const COVE_SYSTEM_PROMPT: &str =
    "You are a cybersecurity expert. Verify all advice systematically.";

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Path to a GGUF file, a directory of GGUF files, or a Hugging Face ID
    pub model_path: String,
    /// Prefer the 4-bit quantized weights
    pub use_4bit: bool,
    /// System prompt placed at the top of the conversation
    pub system_prompt: String,
    /// Chain of Verification mode
    pub cove: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.to_string(),
            use_4bit: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            cove: false,
        }
    }
}

impl SessionConfig {
    /// The system prompt actually used for the session.
    pub fn effective_system_prompt(&self) -> &str {
        if self.cove {
            COVE_SYSTEM_PROMPT
        } else {
            &self.system_prompt
        }
    }

    /// Whether the model path points at the default local adapter directory
    pub fn uses_default_model_path(&self) -> bool {
        self.model_path.contains(DEFAULT_MODEL_PATH)
    }
}
