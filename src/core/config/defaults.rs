use crate::core::config::data::Config;
use crate::core::router::{ApiDefaults, OFFICIAL_API_ENDPOINT};
use crate::core::service::ServiceSettings;
use crate::utils::url::non_empty;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const API_ENDPOINT_ENV: &str = "OPENAI_API_ENDPOINT";

impl Config {
    /// Global endpoint/key/version, using the process environment for
    /// values the config leaves unset.
    pub fn api_defaults(&self) -> ApiDefaults {
        self.api_defaults_with_env(|name| std::env::var(name).ok())
    }

    pub fn api_defaults_with_env(&self, env: impl Fn(&str) -> Option<String>) -> ApiDefaults {
        let endpoint = non_empty(self.api_endpoint.as_deref())
            .map(str::to_string)
            .or_else(|| env(API_ENDPOINT_ENV).filter(|value| !value.trim().is_empty()))
            .unwrap_or_else(|| OFFICIAL_API_ENDPOINT.to_string());
        let key = non_empty(self.api_key.as_deref())
            .map(str::to_string)
            .or_else(|| env(API_KEY_ENV).filter(|value| !value.trim().is_empty()));

        ApiDefaults {
            endpoint,
            key,
            version: non_empty(self.api_version.as_deref()).map(str::to_string),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        self.service_settings_with(self.api_defaults())
    }

    pub fn service_settings_with(&self, api: ApiDefaults) -> ServiceSettings {
        ServiceSettings {
            api,
            model_api_configs: self.model_api_configs.clone(),
            title_model: non_empty(self.title_model.as_deref()).map(str::to_string),
            auto_title: self.auto_title,
            count_total_tokens: self.count_total_tokens,
            language: self.language().to_string(),
        }
    }

    /// Sets a global key by its CLI name. Returns an error naming the
    /// accepted keys for anything unknown.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "api-endpoint" => self.api_endpoint = Some(value.to_string()),
            "api-key" => self.api_key = Some(value.to_string()),
            "api-version" => self.api_version = Some(value.to_string()),
            "title-model" => self.title_model = Some(value.to_string()),
            "language" => self.language = Some(value.to_string()),
            "models-url" => self.models_url = Some(value.to_string()),
            "auto-title" => self.auto_title = parse_switch(value)?,
            "count-total-tokens" => self.count_total_tokens = parse_switch(value)?,
            "default-model" => {
                let mut chat = self.chat_config();
                chat.model = value.to_string();
                self.default_chat_config = Some(chat);
            }
            "max-tokens" => {
                let mut chat = self.chat_config();
                chat.max_tokens = value
                    .parse()
                    .map_err(|_| format!("max-tokens must be a whole number, got '{value}'"))?;
                self.default_chat_config = Some(chat);
            }
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), String> {
        match key {
            "api-endpoint" => self.api_endpoint = None,
            "api-key" => self.api_key = None,
            "api-version" => self.api_version = None,
            "title-model" => self.title_model = None,
            "language" => self.language = None,
            "models-url" => self.models_url = None,
            "auto-title" => self.auto_title = true,
            "count-total-tokens" => self.count_total_tokens = false,
            "default-model" | "max-tokens" => self.default_chat_config = None,
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }
}

pub const SETTABLE_KEYS: &[&str] = &[
    "api-endpoint",
    "api-key",
    "api-version",
    "title-model",
    "language",
    "models-url",
    "auto-title",
    "count-total-tokens",
    "default-model",
    "max-tokens",
];

fn unknown_key(key: &str) -> String {
    format!(
        "Unknown config key '{key}'. Available keys: {}",
        SETTABLE_KEYS.join(", ")
    )
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("expected on/off, got '{value}'")),
    }
}
