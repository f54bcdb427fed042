//! HexaSLM command line entry point.
//!
//! Binary name: `hexaslm`
//!
//! Parses arguments, sets up logging and settings, then hands control to the
//! interactive chat loop.

mod cli;

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{ChatArgs, Cli, Commands};
use hexaslm::chat::{self, ChatOutcome};
use hexaslm::inference::LlamaProvider;
use hexaslm::storage::settings::{
    default_settings_path, load_settings, save_settings, InferenceSettings,
};
use hexaslm::system::gpu::detect_gpu;

/// Exit code when the model cannot be loaded
const EXIT_LOAD_FAILED: u8 = 2;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "info,hexaslm=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat(args) => chat_command(&args),
    }
}

fn chat_command(args: &ChatArgs) -> anyhow::Result<ExitCode> {
    let settings_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_settings_path()
            .map_err(|e| tracing::warn!("No settings location available: {}", e))
            .ok(),
    };

    let gpu = detect_gpu();
    let mut settings = match &settings_path {
        Some(path) => load_settings(path, &gpu),
        None => InferenceSettings::default(),
    };
    args.apply_overrides(&mut settings, &gpu);
    tracing::debug!("Inference settings: {:?}", settings);

    if args.save_config {
        let path = settings_path.context("no settings file location to save to")?;
        save_settings(&path, &settings)
            .with_context(|| format!("failed to save settings to {}", path.display()))?;
        tracing::info!("Saved settings to {}", path.display());
    }

    let config = args.session_config();
    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();

    let outcome = chat::run(&LlamaProvider, &config, &settings, &gpu, &mut input, &mut output)?;
    Ok(exit_code(outcome))
}

fn exit_code(outcome: ChatOutcome) -> ExitCode {
    match outcome {
        ChatOutcome::Finished(_) => ExitCode::SUCCESS,
        ChatOutcome::LoadFailed => ExitCode::from(EXIT_LOAD_FAILED),
    }
}
