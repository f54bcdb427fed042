//! Stand-in model and provider for chat tests

use std::cell::{Cell, RefCell};

use crate::inference::{
    ChatModel, EngineError, GenerationParams, LoadProgress, LoadRequest, ModelError,
    ModelProvider, StreamToken, Streamer, TokenId,
};
use crate::types::message::Message;

/// Byte-level "model" that always answers with the same text.
pub(crate) struct StubModel {
    reply: Vec<TokenId>,
    template: bool,
    fail_generation: bool,
    generate_calls: Cell<usize>,
    last_prompt: RefCell<Option<String>>,
}

impl StubModel {
    pub(crate) fn new(reply: &str) -> Self {
        Self {
            reply: reply.bytes().map(TokenId::from).collect(),
            template: true,
            fail_generation: false,
            generate_calls: Cell::new(0),
            last_prompt: RefCell::new(None),
        }
    }

    pub(crate) fn without_template(mut self) -> Self {
        self.template = false;
        self
    }

    pub(crate) fn failing_generation(mut self) -> Self {
        self.fail_generation = true;
        self
    }

    pub(crate) fn generate_calls(&self) -> usize {
        self.generate_calls.get()
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.last_prompt.borrow().clone()
    }
}

impl ChatModel for StubModel {
    fn apply_chat_template(&self, messages: &[Message]) -> Result<String, EngineError> {
        if !self.template {
            return Err(EngineError::Template("no chat template".to_string()));
        }
        let mut out: String = messages
            .iter()
            .map(|m| format!("<{}>{}", m.role, m.content))
            .collect();
        out.push_str("<assistant>");
        Ok(out)
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>, EngineError> {
        *self.last_prompt.borrow_mut() = Some(text.to_string());
        Ok(text.bytes().map(TokenId::from).collect())
    }

    fn generate(
        &self,
        prompt: &[TokenId],
        _params: &GenerationParams,
        streamer: &mut dyn Streamer,
    ) -> Result<Vec<TokenId>, EngineError> {
        self.generate_calls.set(self.generate_calls.get() + 1);
        if self.fail_generation {
            return Err(EngineError::Decode("stub failure".to_string()));
        }

        let text = self.decode(&self.reply)?;
        streamer.on_token(StreamToken::Token(text))?;
        streamer.on_token(StreamToken::Done)?;

        let mut output = prompt.to_vec();
        output.extend_from_slice(&self.reply);
        Ok(output)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, EngineError> {
        let bytes: Vec<u8> = tokens.iter().map(|&t| t as u8).collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Provider that hands out a [`StubModel`] or fails to load
pub(crate) struct StubProvider {
    pub(crate) reply: &'static str,
    pub(crate) fail: bool,
}

impl ModelProvider for StubProvider {
    type Model = StubModel;

    fn load(
        &self,
        request: &LoadRequest,
        progress: &dyn Fn(LoadProgress),
    ) -> Result<StubModel, EngineError> {
        if self.fail {
            return Err(ModelError::NotFound(request.model_path.clone().into()).into());
        }
        progress(LoadProgress::Loading(request.model_path.clone()));
        Ok(StubModel::new(self.reply))
    }
}
