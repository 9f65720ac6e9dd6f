//! Model listing functionality
//!
//! Builds the model registry from the configured models document and prints it.

use std::error::Error;

use tracing::warn;

use crate::api::models::{fetch_models, ModelsDocument};
use crate::core::config::{Config, ConfigOrchestrator};
use crate::core::registry::{Modality, ModelRegistry};

/// Loads the registry once per session. A missing or unreachable models
/// document leaves only the built-in, pinned and custom models.
pub async fn load_registry(client: &reqwest::Client, config: &Config) -> ModelRegistry {
    let document = match config.models_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(source) => match fetch_models(client, source).await {
            Ok(document) => document,
            Err(err) => {
                warn!(source, error = %err, "could not load models document");
                ModelsDocument::default()
            }
        },
        None => ModelsDocument::default(),
    };
    ModelRegistry::from_document(document, &config.custom_models)
}

fn format_price(per_token: f64) -> String {
    if per_token == 0.0 {
        "-".to_string()
    } else {
        format!("${:.2}/M", per_token * 1_000_000.0)
    }
}

pub async fn list_models(orchestrator: &ConfigOrchestrator) -> Result<(), Box<dyn Error>> {
    let config = orchestrator.load_with_cache()?;
    let client = reqwest::Client::new();
    let registry = load_registry(&client, &config).await;

    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    let default_model = config.chat_config().model;
    println!("🎯 Default model: {default_model}");
    println!();

    for id in registry.options() {
        let Some(capability) = registry.get(id) else {
            continue;
        };
        let marker = if config.get_model_api_config(id).is_some() {
            " [routed]"
        } else {
            ""
        };
        let context = capability
            .max_tokens
            .map(|tokens| format!("{tokens} ctx"))
            .unwrap_or_else(|| "? ctx".to_string());
        let pricing = match capability.modality {
            Modality::Image => format!("${:.3}/image", capability.cost.image.price),
            Modality::Text => format!(
                "in {} out {}",
                format_price(capability.cost.prompt.price),
                format_price(capability.cost.completion.price)
            ),
        };
        println!(
            "  • {}{marker}  ({}, {}{}, {pricing})",
            capability.display_name,
            capability.modality.as_str(),
            context,
            if capability.streaming_supported {
                ", streaming"
            } else {
                ""
            },
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_document_falls_back_to_builtins() {
        let config = Config {
            models_url: Some("/definitely/not/here/models.json".to_string()),
            ..Default::default()
        };

        let registry = load_registry(&reqwest::Client::new(), &config).await;

        assert!(registry.get("dall-e-2").is_some());
        assert!(registry.get("gpt-4-0125-preview").is_some());
    }

    #[test]
    fn prices_are_shown_per_million_tokens() {
        assert_eq!(format_price(0.0), "-");
        assert_eq!(format_price(0.000005), "$5.00/M");
    }
}
