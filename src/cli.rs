//! Command line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use hexaslm::storage::settings::InferenceSettings;
use hexaslm::system::gpu::GpuInfo;
use hexaslm::types::config::{SessionConfig, DEFAULT_MODEL_PATH, DEFAULT_SYSTEM_PROMPT};

/// HexaSLM - chat with a local cybersecurity language model.
#[derive(Parser, Debug)]
#[command(name = "hexaslm", version, about, long_about = None)]
pub struct Cli {
    /// Only print errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session.
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// GGUF file, directory of GGUF files, or Hugging Face repo id.
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    pub model_path: String,

    /// Prefer a 4-bit quantization when several are available (default).
    #[arg(long, overrides_with = "no_use_4bit")]
    pub use_4bit: bool,

    /// Prefer the highest-precision quantization available.
    #[arg(long, overrides_with = "use_4bit")]
    pub no_use_4bit: bool,

    /// System prompt used when CoVe mode is off.
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Enable Chain of Verification mode.
    #[arg(long)]
    pub cove: bool,

    #[arg(long)]
    pub max_new_tokens: Option<u32>,

    #[arg(long)]
    pub context_size: Option<u32>,

    /// Layers to offload to the GPU (0 = CPU only; auto-detected if unset).
    #[arg(long)]
    pub gpu_layers: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub seed: Option<u32>,

    /// Settings file (defaults to settings.json in the user config directory).
    #[arg(long, env = "HEXASLM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write the effective inference settings back to the settings file.
    #[arg(long)]
    pub save_config: bool,
}

impl ChatArgs {
    pub fn use_4bit(&self) -> bool {
        self.use_4bit || !self.no_use_4bit
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model_path: self.model_path.clone(),
            use_4bit: self.use_4bit(),
            system_prompt: self.system_prompt.clone(),
            cove: self.cove,
        }
    }

    /// Layer command line values over loaded settings, then re-validate.
    pub fn apply_overrides(&self, settings: &mut InferenceSettings, gpu: &GpuInfo) {
        if let Some(n) = self.max_new_tokens {
            settings.max_new_tokens = n;
        }
        if let Some(n) = self.context_size {
            settings.context_size = n;
        }
        if let Some(n) = self.gpu_layers {
            settings.gpu_layers = Some(n);
        }
        if let Some(t) = self.temperature {
            settings.temperature = t;
        }
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        settings.validate(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_args(args: &[&str]) -> ChatArgs {
        let mut argv = vec!["hexaslm", "chat"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Chat(args) => args,
        }
    }

    #[test]
    fn test_chat_defaults() {
        let args = chat_args(&[]);
        let config = args.session_config();

        assert_eq!(config.model_path, "models/cove_cybersec_lora");
        assert!(config.use_4bit);
        assert_eq!(config.system_prompt, "You are a cybersecurity expert assistant.");
        assert!(!config.cove);
        assert!(!args.save_config);
    }

    #[test]
    fn test_4bit_toggle() {
        assert!(!chat_args(&["--no-use-4bit"]).use_4bit());
        assert!(chat_args(&["--use-4bit"]).use_4bit());
        assert!(chat_args(&["--no-use-4bit", "--use-4bit"]).use_4bit());
        assert!(!chat_args(&["--use-4bit", "--no-use-4bit"]).use_4bit());
    }

    #[test]
    fn test_chat_options() {
        let args = chat_args(&[
            "--model-path",
            "TheBloke/Some-Model-GGUF",
            "--system-prompt",
            "Be brief.",
            "--cove",
        ]);
        let config = args.session_config();

        assert_eq!(config.model_path, "TheBloke/Some-Model-GGUF");
        assert_eq!(config.system_prompt, "Be brief.");
        assert!(config.cove);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["hexaslm", "chat", "-vv", "--quiet"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
    }

    #[test]
    fn test_overrides_are_validated() {
        let args = chat_args(&[
            "--max-new-tokens",
            "64",
            "--temperature",
            "9.0",
            "--gpu-layers",
            "0",
            "--seed",
            "7",
        ]);
        let mut settings = InferenceSettings::default();
        args.apply_overrides(&mut settings, &GpuInfo::default());

        assert_eq!(settings.max_new_tokens, 64);
        assert_eq!(settings.gpu_layers, Some(0));
        assert_eq!(settings.seed, 7);
        assert!(settings.temperature <= 2.0);
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["hexaslm", "serve"]).is_err());
    }
}
