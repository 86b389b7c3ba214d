//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, loads configuration and
//! dispatches to the chat interface or one of the one-shot commands.

pub mod models;
pub mod say;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::models::{list_models, load_model, show_status, unload_models};
use crate::cli::say::run_say;
use crate::core::config::{ClientConfig, ConfigFile};
use crate::logging::{init_tracing, DEFAULT_CLI_LEVEL, DEFAULT_TUI_LEVEL};
use crate::ui::chat_loop::run_chat;

#[derive(Parser, Debug)]
#[command(name = "lazylms")]
#[command(version)]
#[command(about = "A terminal client for chatting with models served by LM Studio")]
#[command(
    long_about = "lazylms is a full-screen terminal client for LM Studio. It lists, loads and \
unloads models through the `lms` tool and streams chat responses from the local server.\n\n\
Configuration is read from config.toml in the platform config directory (or --config), \
and command-line flags override it.\n\n\
Controls:\n\
  Tab/Shift+Tab     Cycle panels (1-5 jump directly)\n\
  Enter             Send the message / load the selected model\n\
  Esc               Cancel the streaming response\n\
  u / U             Unload the selected model / all models\n\
  Ctrl+S            Edit the system prompt\n\
  Ctrl+L            Clear the conversation\n\
  ?                 Show help\n\
  q / Ctrl+C        Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// LM Studio server host
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// LM Studio server port
    #[arg(long, global = true, value_name = "PORT")]
    pub port: Option<u32>,

    /// URL scheme (http or https)
    #[arg(long, global = true, value_name = "SCHEME")]
    pub scheme: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries after a connection failure or 5xx response
    #[arg(long, global = true, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Base delay between retries in milliseconds, doubled on each attempt
    #[arg(long, global = true, value_name = "MS")]
    pub retry_delay: Option<u64>,

    /// Maximum number of messages kept in the conversation
    #[arg(long, global = true, value_name = "N")]
    pub max_history: Option<usize>,

    /// Path to a config.toml to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write diagnostics to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Model to chat with (defaults to the first loaded model)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Send a single prompt and stream the answer to stdout
    Say {
        /// System prompt for this request
        #[arg(long, value_name = "TEXT")]
        system: Option<String>,
        /// Prompt text; multiple words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List loaded and downloaded models
    Models {
        /// Ask LM Studio whether each downloaded model fits in memory
        #[arg(long)]
        estimates: bool,
    },
    /// Load a downloaded model
    Load {
        model: String,
    },
    /// Unload a model, or every model with --all
    Unload {
        #[arg(required_unless_present = "all")]
        model: Option<String>,
        #[arg(long, conflicts_with = "model")]
        all: bool,
    },
    /// Show whether the LM Studio server is running
    Status,
}

impl Args {
    /// Flags that override configuration values.
    pub fn overrides(&self) -> ConfigFile {
        ConfigFile {
            host: self.host.clone(),
            port: self.port,
            scheme: self.scheme.clone(),
            http_timeout_secs: self.timeout,
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_delay,
            max_conversation_length: self.max_history,
            ..ConfigFile::default()
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let config = match ClientConfig::load(args.config.as_deref(), &args.overrides()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ Configuration error: {err}");
            std::process::exit(1);
        }
    };

    let command = args.command.unwrap_or(Commands::Chat);
    let log_file = args.log_file.as_deref();
    match (&command, log_file) {
        // stderr belongs to the terminal UI
        (Commands::Chat, None) => {}
        (Commands::Chat, Some(path)) => init_tracing(Some(path), DEFAULT_TUI_LEVEL)
            .map_err(|err| err.to_string())?,
        (_, path) => init_tracing(path, DEFAULT_CLI_LEVEL).map_err(|err| err.to_string())?,
    }
    tracing::debug!(base_url = %config.base_url(), "configuration loaded");

    match command {
        Commands::Chat => run_chat(config, args.model).await,
        Commands::Say { system, prompt } => run_say(&config, prompt, system, args.model).await,
        Commands::Models { estimates } => list_models(estimates).await,
        Commands::Load { model } => load_model(&model).await,
        Commands::Unload { model, all } => unload_models(model.as_deref(), all).await,
        Commands::Status => show_status().await,
    }
}
