//! Endpoint / credential resolution for a model.
//!
//! Resolution order:
//! 1. A [`ModelApiConfig`] for the model wins for endpoint, key and version.
//!    A missing per-model key (or endpoint) falls back to the global one.
//! 2. With no key anywhere and the official endpoint in effect, resolution
//!    fails with [`ChatError::MissingApiKey`] before any network call.
//! 3. Image models aimed at the official text endpoint are redirected to the
//!    official image endpoint. Custom endpoints are used verbatim.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::ChatError;
use crate::core::registry::Modality;
use crate::utils::url::{non_empty, same_endpoint};

pub const OFFICIAL_API_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const OFFICIAL_IMAGE_API_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";

/// Per-model endpoint and credential override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelApiConfig {
    pub model_id: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModelApiConfig {
    pub fn new(
        model_id: impl Into<String>,
        endpoint: impl Into<String>,
        key: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            endpoint: endpoint.into(),
            key: key.into(),
            version,
        }
    }
}

/// Override table, unique by model id. Later entries replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ModelApiConfig>", into = "Vec<ModelApiConfig>")]
pub struct ModelApiConfigs {
    entries: Vec<ModelApiConfig>,
}

impl From<Vec<ModelApiConfig>> for ModelApiConfigs {
    fn from(entries: Vec<ModelApiConfig>) -> Self {
        let mut configs = ModelApiConfigs::default();
        for entry in entries {
            configs.upsert(entry);
        }
        configs
    }
}

impl From<ModelApiConfigs> for Vec<ModelApiConfig> {
    fn from(configs: ModelApiConfigs) -> Self {
        configs.entries
    }
}

impl ModelApiConfigs {
    /// Inserts `config`, replacing (and moving to the end) any entry for the
    /// same model id.
    pub fn upsert(&mut self, config: ModelApiConfig) {
        self.entries.retain(|entry| entry.model_id != config.model_id);
        self.entries.push(config);
    }

    pub fn remove(&mut self, model_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.model_id != model_id);
        before != self.entries.len()
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelApiConfig> {
        self.entries.iter().find(|entry| entry.model_id == model_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelApiConfig> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Global endpoint/key/version used when no override applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDefaults {
    pub endpoint: String,
    pub key: Option<String>,
    pub version: Option<String>,
}

impl Default for ApiDefaults {
    fn default() -> Self {
        Self {
            endpoint: OFFICIAL_API_ENDPOINT.to_string(),
            key: None,
            version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub endpoint: String,
    pub key: Option<String>,
    pub version: Option<String>,
}

pub struct RequestRouter<'a> {
    defaults: &'a ApiDefaults,
    overrides: &'a ModelApiConfigs,
}

impl<'a> RequestRouter<'a> {
    pub fn new(defaults: &'a ApiDefaults, overrides: &'a ModelApiConfigs) -> Self {
        Self {
            defaults,
            overrides,
        }
    }

    pub fn resolve(&self, model_id: &str, modality: Modality) -> Result<ResolvedRoute, ChatError> {
        let custom = self.overrides.get(model_id);

        let endpoint = custom
            .and_then(|config| non_empty(Some(config.endpoint.as_str())))
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.endpoint.trim().to_string());

        let key = custom
            .and_then(|config| non_empty(Some(config.key.as_str())))
            .or_else(|| non_empty(self.defaults.key.as_deref()))
            .map(str::to_string);

        let version = custom
            .and_then(|config| non_empty(config.version.as_deref()))
            .or_else(|| non_empty(self.defaults.version.as_deref()))
            .map(str::to_string);

        if key.is_none() && same_endpoint(&endpoint, OFFICIAL_API_ENDPOINT) {
            return Err(ChatError::MissingApiKey);
        }

        let endpoint = if modality == Modality::Image
            && same_endpoint(&endpoint, OFFICIAL_API_ENDPOINT)
        {
            OFFICIAL_IMAGE_API_ENDPOINT.to_string()
        } else {
            endpoint
        };

        debug!(
            model = model_id,
            endpoint = %endpoint,
            per_model = custom.is_some(),
            has_key = key.is_some(),
            "route resolved"
        );

        Ok(ResolvedRoute {
            endpoint,
            key,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(key: Option<&str>) -> ApiDefaults {
        ApiDefaults {
            endpoint: OFFICIAL_API_ENDPOINT.to_string(),
            key: key.map(str::to_string),
            version: None,
        }
    }

    #[test]
    fn per_model_override_beats_global_values() {
        let defaults = defaults(Some("G"));
        let mut overrides = ModelApiConfigs::default();
        overrides.upsert(ModelApiConfig::new(
            "X",
            "https://x.example/v1/chat/completions",
            "X-KEY",
            Some("2024-01-01".into()),
        ));

        let route = RequestRouter::new(&defaults, &overrides)
            .resolve("X", Modality::Text)
            .unwrap();

        assert_eq!(route.endpoint, "https://x.example/v1/chat/completions");
        assert_eq!(route.key.as_deref(), Some("X-KEY"));
        assert_eq!(route.version.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn other_models_still_use_global_values() {
        let defaults = defaults(Some("G"));
        let mut overrides = ModelApiConfigs::default();
        overrides.upsert(ModelApiConfig::new("X", "https://x.example", "X-KEY", None));

        let route = RequestRouter::new(&defaults, &overrides)
            .resolve("Y", Modality::Text)
            .unwrap();

        assert_eq!(route.endpoint, OFFICIAL_API_ENDPOINT);
        assert_eq!(route.key.as_deref(), Some("G"));
    }

    #[test]
    fn absent_per_model_key_falls_back_to_global() {
        let defaults = defaults(Some("G"));
        let mut overrides = ModelApiConfigs::default();
        overrides.upsert(ModelApiConfig::new("X", "https://x.example", "", None));

        let route = RequestRouter::new(&defaults, &overrides)
            .resolve("X", Modality::Text)
            .unwrap();

        assert_eq!(route.endpoint, "https://x.example");
        assert_eq!(route.key.as_deref(), Some("G"));
    }

    #[test]
    fn missing_key_on_official_endpoint_fails() {
        let defaults = defaults(None);
        let overrides = ModelApiConfigs::default();

        let err = RequestRouter::new(&defaults, &overrides)
            .resolve("gpt-4o", Modality::Text)
            .unwrap_err();

        assert_eq!(err, ChatError::MissingApiKey);
    }

    #[test]
    fn missing_key_on_custom_endpoint_is_allowed() {
        let defaults = ApiDefaults {
            endpoint: "http://localhost:11434/v1/chat/completions".into(),
            key: None,
            version: None,
        };
        let overrides = ModelApiConfigs::default();

        let route = RequestRouter::new(&defaults, &overrides)
            .resolve("llama3", Modality::Text)
            .unwrap();

        assert_eq!(route.key, None);
        assert_eq!(route.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn image_models_are_redirected_from_official_text_endpoint() {
        let defaults = defaults(Some("G"));
        let overrides = ModelApiConfigs::default();

        let route = RequestRouter::new(&defaults, &overrides)
            .resolve("dall-e-2", Modality::Image)
            .unwrap();

        assert_eq!(route.endpoint, OFFICIAL_IMAGE_API_ENDPOINT);
    }

    #[test]
    fn custom_image_endpoints_are_used_verbatim() {
        let defaults = defaults(Some("G"));
        let mut overrides = ModelApiConfigs::default();
        overrides.upsert(ModelApiConfig::new(
            "dall-e-3",
            "https://images.example/v1/chat/completions",
            "K",
            None,
        ));

        let route = RequestRouter::new(&defaults, &overrides)
            .resolve("dall-e-3", Modality::Image)
            .unwrap();

        assert_eq!(route.endpoint, "https://images.example/v1/chat/completions");
    }

    #[test]
    fn per_model_endpoint_keeps_trailing_slash() {
        let defaults = defaults(Some("G"));
        let mut overrides = ModelApiConfigs::default();
        overrides.upsert(ModelApiConfig::new(
            "X",
            "  https://proxy.example/v1/chat/completions/ ",
            "",
            None,
        ));

        let route = RequestRouter::new(&defaults, &overrides)
            .resolve("X", Modality::Text)
            .unwrap();

        assert_eq!(route.endpoint, "https://proxy.example/v1/chat/completions/");
    }

    #[test]
    fn official_endpoint_with_trailing_slash_still_needs_a_key() {
        let defaults = ApiDefaults {
            endpoint: format!("{OFFICIAL_API_ENDPOINT}/"),
            key: None,
            version: None,
        };
        let overrides = ModelApiConfigs::default();

        let err = RequestRouter::new(&defaults, &overrides)
            .resolve("gpt-4o", Modality::Text)
            .unwrap_err();

        assert_eq!(err, ChatError::MissingApiKey);
    }

    #[test]
    fn upsert_replaces_by_model_id() {
        let mut configs = ModelApiConfigs::default();
        configs.upsert(ModelApiConfig::new("a", "https://one", "k1", None));
        configs.upsert(ModelApiConfig::new("b", "https://two", "k2", None));
        configs.upsert(ModelApiConfig::new("a", "https://three", "k3", None));

        assert_eq!(configs.len(), 2);
        assert_eq!(configs.get("a").unwrap().endpoint, "https://three");
        let order: Vec<&str> = configs.iter().map(|c| c.model_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);

        assert!(configs.remove("b"));
        assert!(!configs.remove("b"));
    }

    #[test]
    fn duplicate_entries_collapse_when_deserialized() {
        let configs: ModelApiConfigs = serde_json::from_str(
            r#"[{"model_id":"a","endpoint":"https://old","key":"1"},
                {"model_id":"a","endpoint":"https://new","key":"2"}]"#,
        )
        .unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs.get("a").unwrap().key, "2");
    }
}
