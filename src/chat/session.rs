//! Chat session
//!
//! Owns the conversation history and turns one user input into one model reply.

use crate::chat::prompts::{fallback_prompt, with_verification};
use crate::inference::{ChatModel, EngineError, GenerationParams, Streamer};
use crate::types::config::SessionConfig;
use crate::types::message::{Conversation, Role};

pub struct ChatSession<M> {
    model: M,
    history: Conversation,
    system_prompt: String,
    cove: bool,
    params: GenerationParams,
}

impl<M: ChatModel> ChatSession<M> {
    pub fn new(model: M, config: &SessionConfig, params: GenerationParams) -> Self {
        let system_prompt = config.effective_system_prompt().to_string();
        Self {
            model,
            history: Conversation::new(system_prompt.clone()),
            system_prompt,
            cove: config.cove,
            params,
        }
    }

    pub fn history(&self) -> &Conversation {
        &self.history
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Render the current history into the prompt for the next reply.
    ///
    /// Falls back to the plain format for `user_input` if the chat template fails.
    pub fn render_prompt(&self, user_input: &str) -> String {
        let prompt = match self.model.apply_chat_template(self.history.messages()) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Chat template failed, using plain format: {}", e);
                fallback_prompt(&self.system_prompt, user_input)
            }
        };
        with_verification(prompt, self.cove)
    }

    /// Run one turn: record the input, generate, record and return the reply.
    pub fn respond(
        &mut self,
        user_input: &str,
        streamer: &mut dyn Streamer,
    ) -> Result<String, EngineError> {
        self.history.push(Role::User, user_input);

        let prompt = self.render_prompt(user_input);
        let prompt_tokens = self.model.encode(&prompt)?;
        tracing::debug!("Prompt is {} tokens", prompt_tokens.len());

        let output = self.model.generate(&prompt_tokens, &self.params, streamer)?;
        let new_tokens = output.get(prompt_tokens.len()..).unwrap_or_default();
        let reply = self.model.decode(new_tokens)?;

        self.history.push(Role::Assistant, reply.clone());
        Ok(reply)
    }
}
