//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod model_api;
pub mod model_list;
pub mod say;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::model_api::{add_model_api, list_model_apis, remove_model_api};
use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::core::config::{Config, ConfigOrchestrator};
use crate::utils::logging::init_logging;

#[derive(Parser)]
#[command(name = "chatpilot")]
#[command(about = "Send prompts to chat-completion and image models from the terminal")]
#[command(
    long_about = "Chatpilot sends a prompt to an OpenAI-compatible chat-completions or \
image-generation endpoint and streams the answer to stdout. Per-model endpoint and \
key overrides let different models talk to different providers.\n\n\
Environment Variables (fallback if not configured):\n\
  OPENAI_API_KEY        API key for the global endpoint\n\
  OPENAI_API_ENDPOINT   Chat-completions endpoint (defaults to the official one)\n\
  RUST_LOG              Diagnostic log filter (logs go to stderr)\n\n\
Controls:\n\
  Ctrl+C            Stop the generation in progress"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print debug diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt and print the response
    Say {
        /// Model to use (defaults to the configured default model)
        #[arg(short = 'm', long, value_name = "MODEL")]
        model: Option<String>,
        /// Conversation file to continue and save back to
        #[arg(long, value_name = "FILE")]
        chat: Option<PathBuf>,
        /// Continue the conversation stored in the default data directory
        #[arg(short = 'r', long, conflicts_with = "chat")]
        resume: bool,
        /// Prompt text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// List the models in the registry
    Models,
    /// Manage per-model endpoint and key overrides
    ModelApi {
        #[command(subcommand)]
        action: ModelApiAction,
    },
    /// Set configuration values, or print them when no key is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

#[derive(Subcommand)]
pub enum ModelApiAction {
    /// Route a model to its own endpoint and key
    Add {
        model_id: String,
        endpoint: String,
        /// Key for this endpoint; the global key is used when omitted
        #[arg(long)]
        key: Option<String>,
        /// API version, sent as the `api-version` query parameter
        #[arg(long)]
        version: Option<String>,
    },
    /// Remove the override for a model
    Remove { model_id: String },
    /// List configured overrides
    List,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = match args.config {
        Some(path) => path,
        None => Config::get_config_path()?,
    };
    let orchestrator = ConfigOrchestrator::new(config_path);

    match args.command {
        Commands::Say {
            model,
            chat,
            resume,
            prompt,
        } => {
            let chat = match chat {
                Some(path) => Some(path),
                None if resume => Some(Config::get_chats_path()?),
                None => None,
            };
            run_say(&orchestrator, prompt, model, chat).await
        }
        Commands::Models => list_models(&orchestrator).await,
        Commands::ModelApi { action } => match action {
            ModelApiAction::Add {
                model_id,
                endpoint,
                key,
                version,
            } => add_model_api(&orchestrator, model_id, endpoint, key, version),
            ModelApiAction::Remove { model_id } => remove_model_api(&orchestrator, &model_id),
            ModelApiAction::List => list_model_apis(&orchestrator),
        },
        Commands::Set { key, value } => {
            let Some(key) = key.filter(|_| !value.is_empty()) else {
                orchestrator.load_with_cache()?.print_all();
                return Ok(());
            };
            let value = value.join(" ");
            orchestrator.mutate(|config| {
                config.set_value(&key, &value)?;
                Ok(())
            })?;
            println!("✅ Set {key} to: {value}");
            Ok(())
        }
        Commands::Unset { key } => {
            orchestrator.mutate(|config| {
                config.unset_value(&key)?;
                Ok(())
            })?;
            println!("✅ Unset {key}");
            Ok(())
        }
    }
}
