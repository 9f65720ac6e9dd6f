use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::conversation::ChatConfig;
use crate::core::registry::CustomModel;
use crate::core::router::{ModelApiConfig, ModelApiConfigs};

pub const DEFAULT_LANGUAGE: &str = "en";

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Global chat-completions endpoint. Falls back to `OPENAI_API_ENDPOINT`,
    /// then the official endpoint.
    pub api_endpoint: Option<String>,
    /// Global key. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Deployment API version (Azure-style endpoints).
    pub api_version: Option<String>,
    /// Per-model endpoint/key overrides, unique by model id.
    #[serde(default, skip_serializing_if = "ModelApiConfigs::is_empty")]
    pub model_api_configs: ModelApiConfigs,
    /// Model used for title generation; the conversation's model when unset.
    pub title_model: Option<String>,
    #[serde(default = "default_true")]
    pub auto_title: bool,
    #[serde(default)]
    pub count_total_tokens: bool,
    /// Language the generated titles are requested in
    pub language: Option<String>,
    /// Models document source: an http(s) URL or a local file path.
    pub models_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_models: Vec<CustomModel>,
    /// Settings for newly created conversations
    pub default_chat_config: Option<ChatConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_endpoint: None,
            api_key: None,
            api_version: None,
            model_api_configs: ModelApiConfigs::default(),
            title_model: None,
            auto_title: true,
            count_total_tokens: false,
            language: None,
            models_url: None,
            custom_models: Vec::new(),
            default_chat_config: None,
        }
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/chatpilot/config.toml` → `~/.config/chatpilot/config.toml`
/// - Windows: paths are shown unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn language(&self) -> &str {
        self.language
            .as_deref()
            .filter(|language| !language.trim().is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn chat_config(&self) -> ChatConfig {
        self.default_chat_config.clone().unwrap_or_default()
    }

    pub fn add_model_api_config(&mut self, config: ModelApiConfig) {
        self.model_api_configs.upsert(config);
    }

    pub fn remove_model_api_config(&mut self, model_id: &str) -> bool {
        self.model_api_configs.remove(model_id)
    }

    pub fn get_model_api_config(&self, model_id: &str) -> Option<&ModelApiConfig> {
        self.model_api_configs.get(model_id)
    }

    pub fn list_model_api_configs(&self) -> Vec<&ModelApiConfig> {
        self.model_api_configs.iter().collect()
    }
}
