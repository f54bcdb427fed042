//! Interactive chat
//!
//! Loads the model through a [`ModelProvider`] and drives the terminal conversation.

pub mod banner;
pub mod input;
pub mod loop_runner;
pub mod prompts;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

use std::io::{BufRead, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::inference::{ChatModel, EngineError, LoadProgress, LoadRequest, ModelProvider};
use crate::storage::settings::InferenceSettings;
use crate::system::gpu::GpuInfo;
use crate::types::config::{SessionConfig, DEFAULT_MODEL_PATH};
use crate::types::model::format_size;

pub use loop_runner::{run_chat_loop, LoopExit, LoopSummary};
pub use session::ChatSession;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// How a chat session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The loop ran and ended normally
    Finished(LoopSummary),
    /// The model could not be loaded; the loop never started
    LoadFailed,
}

fn loading_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Loading model...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Start a chat session: banner, model load, then the input loop.
///
/// `gpu` is the hardware probe result used when no layer count is configured.
pub fn run<P, R, W>(
    provider: &P,
    config: &SessionConfig,
    settings: &InferenceSettings,
    gpu: &GpuInfo,
    input: &mut R,
    output: &mut W,
) -> Result<ChatOutcome, ChatError>
where
    P: ModelProvider,
    R: BufRead,
    W: Write,
{
    banner::print_welcome_banner(output, config.cove)?;

    let request = LoadRequest {
        model_path: config.model_path.clone(),
        use_4bit: config.use_4bit,
        gpu_layers: settings.resolved_gpu_layers(gpu),
        context_size: settings.context_size,
    };
    tracing::debug!("Load request: {:?}", request);

    let spinner = loading_spinner();
    let loaded = provider.load(&request, &|event| match event {
        LoadProgress::Downloading { downloaded, total } => spinner.set_message(format!(
            "Downloading model... {} / {}",
            format_size(downloaded),
            format_size(total)
        )),
        LoadProgress::Loading(path) => spinner.set_message(format!("Loading model {path}...")),
    });
    spinner.finish_and_clear();

    let model = match loaded {
        Ok(model) => model,
        Err(e) => {
            tracing::error!("Failed to load model from {}: {}", config.model_path, e);
            let hint = config.uses_default_model_path().then_some(DEFAULT_MODEL_PATH);
            banner::print_load_failure(output, &e, hint)?;
            return Ok(ChatOutcome::LoadFailed);
        }
    };

    banner::print_load_success(output, &config.model_path, model.model_info())?;
    banner::print_exit_hint(output)?;
    if config.cove {
        tracing::info!("Chain of Verification mode enabled");
    }

    let mut session = ChatSession::new(model, config, settings.generation_params());
    let summary = run_chat_loop(&mut session, input, output)?;

    tracing::info!(
        "Session ended after {} turns ({:?})",
        summary.turns,
        summary.exit
    );
    output.flush()?;
    Ok(ChatOutcome::Finished(summary))
}
