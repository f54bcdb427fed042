//! llama.cpp inference engine
//!
//! Loads GGUF models through `llama-cpp-2` and implements [`ChatModel`] on top of them.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use llama_cpp_2::{send_logs_to_tracing, LogOptions};
use encoding_rs::{CoderResult, Decoder};
use thiserror::Error;

use crate::inference::model::{classify_source, model_info, resolve_local, ModelError, ModelSource};
use crate::inference::provider::{ChatModel, LoadProgress, LoadRequest, ModelProvider, TokenId};
use crate::inference::streaming::{StreamToken, Streamer};
use crate::storage::huggingface::{self, HubError};
use crate::types::message::Message;
use crate::types::model::ModelInfo;

/// Tokens considered by the repetition penalty
const PENALTY_LAST_N: i32 = 64;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to initialize llama backend: {0}")]
    BackendInit(String),
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error("Failed to create inference context: {0}")]
    Context(String),
    #[error("Chat template error: {0}")]
    Template(String),
    #[error("Tokenization failed: {0}")]
    Tokenize(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Detokenization failed: {0}")]
    Detokenize(String),
    #[error("Prompt of {prompt} tokens does not fit a context of {context}")]
    ContextOverflow { prompt: usize, context: u32 },
    #[error("Stream error: {0}")]
    Stream(#[from] std::io::Error),
}

/// Parameters for one generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub seed: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.7,
            top_k: 40,
            top_p: 0.9,
            repeat_penalty: 1.1,
            seed: 1234,
        }
    }
}

/// A GGUF model loaded into llama.cpp
pub struct LlamaEngine {
    backend: LlamaBackend,
    model: LlamaModel,
    info: ModelInfo,
    context_size: u32,
}

impl LlamaEngine {
    /// Load a GGUF file with `gpu_layers` layers offloaded.
    pub fn load(path: &Path, gpu_layers: u32, context_size: u32) -> Result<Self, EngineError> {
        send_logs_to_tracing(LogOptions::default());

        let backend =
            LlamaBackend::init().map_err(|e| EngineError::BackendInit(e.to_string()))?;

        let info = model_info(path)?;
        tracing::info!(
            "Loading model {} with {} GPU layers, context {}",
            info.summary(),
            gpu_layers,
            context_size
        );

        let model_params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
        let model = LlamaModel::load_from_file(&backend, path, &model_params)
            .map_err(|e| EngineError::ModelLoad(e.to_string()))?;

        tracing::info!("Model loaded: {:?}", path);
        Ok(Self {
            backend,
            model,
            info,
            context_size,
        })
    }

    fn token_bytes(&self, token: LlamaToken) -> Result<Vec<u8>, EngineError> {
        self.model
            .token_to_bytes(token, Special::Plaintext)
            .map_err(|e| EngineError::Detokenize(e.to_string()))
    }
}

fn build_sampler(params: &GenerationParams) -> LlamaSampler {
    let penalties = LlamaSampler::penalties(PENALTY_LAST_N, params.repeat_penalty, 0.0, 0.0);

    if params.temperature <= 0.0 {
        return LlamaSampler::chain_simple([penalties, LlamaSampler::greedy()]);
    }

    LlamaSampler::chain_simple([
        penalties,
        LlamaSampler::top_k(params.top_k as i32),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(params.seed),
    ])
}

/// Streams token bytes as text; characters may be split across tokens
struct TokenTextDecoder {
    decoder: Decoder,
}

impl TokenTextDecoder {
    fn new() -> Self {
        Self {
            decoder: encoding_rs::UTF_8.new_decoder(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> String {
        self.decode(bytes, false)
    }

    /// Flush bytes held back for an unfinished character
    fn finish(&mut self) -> String {
        self.decode(&[], true)
    }

    fn decode(&mut self, bytes: &[u8], last: bool) -> String {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 8);
        let mut text = String::with_capacity(capacity);
        let (result, read, _) = self.decoder.decode_to_string(bytes, &mut text, last);
        if matches!(result, CoderResult::OutputFull) || read < bytes.len() {
            tracing::warn!("Dropped {} undecoded bytes from stream", bytes.len() - read);
        }
        text
    }
}

/// Number of new tokens that still fit after the prompt
fn generation_budget(prompt_len: usize, requested: u32, context_size: u32) -> Result<usize, EngineError> {
    let context = context_size as usize;
    if prompt_len >= context {
        return Err(EngineError::ContextOverflow {
            prompt: prompt_len,
            context: context_size,
        });
    }
    Ok((requested as usize).min(context - prompt_len))
}

impl ChatModel for LlamaEngine {
    fn apply_chat_template(&self, messages: &[Message]) -> Result<String, EngineError> {
        let template = self
            .model
            .chat_template(None)
            .map_err(|e| EngineError::Template(e.to_string()))?;

        let chat = messages
            .iter()
            .map(|m| LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::Template(e.to_string()))?;

        self.model
            .apply_chat_template(&template, &chat, true)
            .map_err(|e| EngineError::Template(e.to_string()))
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>, EngineError> {
        let tokens = self
            .model
            .str_to_token(text, AddBos::Always)
            .map_err(|e| EngineError::Tokenize(e.to_string()))?;
        Ok(tokens.into_iter().map(|t| t.0).collect())
    }

    fn generate(
        &self,
        prompt: &[TokenId],
        params: &GenerationParams,
        streamer: &mut dyn Streamer,
    ) -> Result<Vec<TokenId>, EngineError> {
        if prompt.is_empty() {
            return Err(EngineError::Tokenize("empty prompt".to_string()));
        }
        let budget = generation_budget(prompt.len(), params.max_new_tokens, self.context_size)?;
        if budget < params.max_new_tokens as usize {
            tracing::warn!(
                "Only {} of {} new tokens fit in the context window",
                budget,
                params.max_new_tokens
            );
        }

        // A fresh context per request holds this request's KV cache
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.context_size))
            .with_n_batch(self.context_size);
        let mut ctx = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| EngineError::Context(e.to_string()))?;

        let mut batch = LlamaBatch::new(self.context_size as usize, 1);
        let last_index = prompt.len() - 1;
        for (i, &id) in prompt.iter().enumerate() {
            // Logits are only needed for the last prompt token
            batch
                .add(LlamaToken::new(id), i as i32, &[0], i == last_index)
                .map_err(|e| EngineError::Decode(e.to_string()))?;
        }
        ctx.decode(&mut batch)
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        let mut sampler = build_sampler(params);
        let mut text = TokenTextDecoder::new();
        let mut output = prompt.to_vec();
        let mut n_cur = batch.n_tokens();

        for _ in 0..budget {
            // sample() also feeds the token back into the penalty sampler
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            if self.model.is_eog_token(token) {
                break;
            }
            output.push(token.0);

            let piece = text.push(&self.token_bytes(token)?);
            if !piece.is_empty() {
                streamer.on_token(StreamToken::Token(piece))?;
            }

            batch.clear();
            batch
                .add(token, n_cur, &[0], true)
                .map_err(|e| EngineError::Decode(e.to_string()))?;
            n_cur += 1;
            ctx.decode(&mut batch)
                .map_err(|e| EngineError::Decode(e.to_string()))?;
        }

        let tail = text.finish();
        if !tail.is_empty() {
            streamer.on_token(StreamToken::Token(tail))?;
        }
        streamer.on_token(StreamToken::Done)?;
        tracing::debug!("Generated {} tokens", output.len() - prompt.len());
        Ok(output)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, EngineError> {
        let mut bytes = Vec::new();
        for &id in tokens {
            bytes.extend(self.token_bytes(LlamaToken::new(id))?);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn model_info(&self) -> Option<&ModelInfo> {
        Some(&self.info)
    }
}

/// Loads models from disk or the Hugging Face Hub into llama.cpp
#[derive(Debug, Default, Clone, Copy)]
pub struct LlamaProvider;

impl LlamaProvider {
    fn resolve(
        &self,
        request: &LoadRequest,
        progress: &dyn Fn(LoadProgress),
    ) -> Result<PathBuf, EngineError> {
        match classify_source(&request.model_path) {
            ModelSource::Local(path) => Ok(resolve_local(&path, request.use_4bit)?),
            ModelSource::Hub(id) => {
                tracing::info!("Fetching {} from the Hugging Face Hub", id);
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| EngineError::ModelLoad(format!("async runtime: {e}")))?;
                let path = runtime.block_on(huggingface::download_model(
                    &id,
                    request.use_4bit,
                    |downloaded, total| progress(LoadProgress::Downloading { downloaded, total }),
                ))?;
                Ok(path)
            }
        }
    }
}

impl ModelProvider for LlamaProvider {
    type Model = LlamaEngine;

    fn load(
        &self,
        request: &LoadRequest,
        progress: &dyn Fn(LoadProgress),
    ) -> Result<LlamaEngine, EngineError> {
        let path = self.resolve(request, progress)?;
        progress(LoadProgress::Loading(path.display().to_string()));
        LlamaEngine::load(&path, request.gpu_layers, request.context_size)
    }
}
