//! Model capability registry.
//!
//! Built once per session from a models document (OpenRouter-style
//! `data[]` listing), a handful of built-in entries, and the user's custom
//! models. The modality string is classified into [`Modality`] here so the
//! rest of the engine branches on an enum.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::models::{ModelData, ModelsDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    /// `text->text` and any other modality that produces text.
    Text,
    /// Any modality ending in `->image`.
    Image,
}

impl Modality {
    pub fn from_architecture(modality: &str) -> Self {
        if modality.trim().ends_with("->image") {
            Modality::Image
        } else {
            Modality::Text
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "text->text",
            Modality::Image => "text->image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Price {
    pub price: f64,
    pub unit: u32,
}

impl Price {
    pub fn per_unit(price: f64) -> Self {
        Self { price, unit: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModelCost {
    pub prompt: Price,
    pub completion: Price,
    pub image: Price,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCapability {
    pub modality: Modality,
    /// Context length advertised by the provider; `None` for unknown models.
    pub max_tokens: Option<usize>,
    pub streaming_supported: bool,
    pub cost: ModelCost,
    pub display_name: String,
}

impl ModelCapability {
    /// Capability assumed for model ids the registry has never seen, so
    /// custom endpoints with arbitrary model names keep working.
    pub fn fallback(model_id: &str) -> Self {
        Self {
            modality: Modality::Text,
            max_tokens: None,
            streaming_supported: true,
            cost: ModelCost::default(),
            display_name: model_id.to_string(),
        }
    }
}

/// A user-declared model, stored in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    #[serde(default = "default_custom_modality")]
    pub modality: String,
    #[serde(default)]
    pub pricing: CustomPricing,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomPricing {
    #[serde(default)]
    pub prompt: f64,
    #[serde(default)]
    pub completion: f64,
    #[serde(default)]
    pub image: f64,
}

fn default_context_length() -> usize {
    4096
}

fn default_custom_modality() -> String {
    Modality::Text.as_str().to_string()
}

fn default_stream() -> bool {
    true
}

struct PinnedModel {
    id: &'static str,
    context_length: usize,
    prompt: f64,
    completion: f64,
    image: f64,
    streaming: bool,
}

const PINNED_MODELS: &[PinnedModel] = &[
    PinnedModel {
        id: "gpt-4-0125-preview",
        context_length: 128_000,
        prompt: 0.00001,
        completion: 0.00003,
        image: 0.01445,
        streaming: true,
    },
    PinnedModel {
        id: "gpt-4-turbo-2024-04-09",
        context_length: 128_000,
        prompt: 0.00001,
        completion: 0.00003,
        image: 0.01445,
        streaming: false,
    },
];

fn builtin_image_models() -> Vec<ModelData> {
    vec![ModelData::image_model("dall-e-2", "DALL-E 2", 1000, "0.020")]
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelCapability>,
    options: Vec<String>,
}

impl ModelRegistry {
    pub fn from_document(document: ModelsDocument, custom_models: &[CustomModel]) -> Self {
        let mut registry = ModelRegistry::default();

        for model in document.data.into_iter().chain(builtin_image_models()) {
            let id = model.short_id().to_string();
            let modality = Modality::from_architecture(&model.architecture.modality);
            let image_price = parse_price(model.pricing.image.as_deref());
            let capability = ModelCapability {
                modality,
                max_tokens: Some(model.context_length),
                // Providers do not advertise streaming; o1 previews and
                // image models are known not to stream.
                streaming_supported: !(id.contains("o1-") || modality == Modality::Image),
                cost: ModelCost {
                    prompt: Price::per_unit(parse_price(model.pricing.prompt.as_deref())),
                    completion: Price::per_unit(parse_price(model.pricing.completion.as_deref())),
                    image: Price::per_unit(image_price.max(0.0)),
                },
                display_name: id.clone(),
            };
            registry.insert(id, capability);
        }

        for pinned in PINNED_MODELS {
            registry.insert(
                pinned.id.to_string(),
                ModelCapability {
                    modality: Modality::Text,
                    max_tokens: Some(pinned.context_length),
                    streaming_supported: pinned.streaming,
                    cost: ModelCost {
                        prompt: Price::per_unit(pinned.prompt),
                        completion: Price::per_unit(pinned.completion),
                        image: Price::per_unit(pinned.image),
                    },
                    display_name: pinned.id.to_string(),
                },
            );
        }

        for custom in custom_models {
            let name = custom.name.as_deref().unwrap_or(&custom.id);
            registry.insert(
                custom.id.clone(),
                ModelCapability {
                    modality: Modality::from_architecture(&custom.modality),
                    max_tokens: Some(custom.context_length),
                    streaming_supported: custom.stream,
                    cost: ModelCost {
                        prompt: Price::per_unit(custom.pricing.prompt),
                        completion: Price::per_unit(custom.pricing.completion),
                        image: Price::per_unit(custom.pricing.image),
                    },
                    display_name: format!("{name} (custom)"),
                },
            );
        }

        let custom_ids: Vec<&str> = custom_models.iter().map(|m| m.id.as_str()).collect();
        registry
            .options
            .sort_by_key(|id| option_rank(id, &custom_ids));
        debug!(models = registry.options.len(), "model registry loaded");
        registry
    }

    fn insert(&mut self, id: String, capability: ModelCapability) {
        if self.models.insert(id.clone(), capability).is_none() {
            self.options.push(id);
        }
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelCapability> {
        self.models.get(model_id)
    }

    /// Looks up a model, falling back to a streaming text capability.
    pub fn capability(&self, model_id: &str) -> ModelCapability {
        self.get(model_id).cloned().unwrap_or_else(|| {
            debug!(model = model_id, "model not in registry; assuming streaming text");
            ModelCapability::fallback(model_id)
        })
    }

    /// Model ids in display order.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn parse_price(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

// Custom models first, then gpt-4o, o1, other gpt models, everything else.
// `sort_by_key` is stable, so ties keep insertion order.
fn option_rank(id: &str, custom_ids: &[&str]) -> u8 {
    if custom_ids.contains(&id) {
        0
    } else if id.starts_with("gpt-4o") {
        1
    } else if id.starts_with("o1-") {
        2
    } else if id.starts_with("gpt-") {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> ModelsDocument {
        serde_json::from_str(
            r#"{"data":[
                {"id":"meta/llama-3","context_length":8192,
                 "pricing":{"prompt":"0.000001","completion":"0.000002","image":"0"},
                 "architecture":{"modality":"text->text"}},
                {"id":"openai/o1-mini","context_length":128000,
                 "pricing":{"prompt":"0.000003","completion":"0.000012"},
                 "architecture":{"modality":"text->text"}},
                {"id":"openai/gpt-4o","context_length":128000,
                 "pricing":{"prompt":"0.000005","completion":"0.000015","image":"0.007225"},
                 "architecture":{"modality":"text+image->text"}}
            ]}"#,
        )
        .expect("document")
    }

    #[test]
    fn modality_is_classified_once() {
        assert_eq!(Modality::from_architecture("text->image"), Modality::Image);
        assert_eq!(Modality::from_architecture("text+image->image"), Modality::Image);
        assert_eq!(Modality::from_architecture("text+image->text"), Modality::Text);
    }

    #[test]
    fn ids_drop_vendor_prefix_and_streaming_is_derived() {
        let registry = ModelRegistry::from_document(document(), &[]);
        let llama = registry.get("llama-3").expect("llama");
        assert!(llama.streaming_supported);
        assert_eq!(llama.max_tokens, Some(8192));
        assert!(!registry.get("o1-mini").expect("o1").streaming_supported);
    }

    #[test]
    fn builtin_image_model_is_always_present() {
        let registry = ModelRegistry::from_document(ModelsDocument::default(), &[]);
        let dalle = registry.get("dall-e-2").expect("dall-e-2");
        assert_eq!(dalle.modality, Modality::Image);
        assert!(!dalle.streaming_supported);
        assert!((dalle.cost.image.price - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn pinned_models_override_streaming_flag() {
        let registry = ModelRegistry::from_document(ModelsDocument::default(), &[]);
        assert!(!registry
            .get("gpt-4-turbo-2024-04-09")
            .expect("pinned")
            .streaming_supported);
    }

    #[test]
    fn options_put_custom_models_first() {
        let custom = CustomModel {
            id: "house-model".into(),
            name: Some("House".into()),
            context_length: 2048,
            modality: "text->text".into(),
            pricing: CustomPricing::default(),
            stream: false,
        };
        let registry = ModelRegistry::from_document(document(), &[custom]);
        let options = registry.options();
        assert_eq!(options[0], "house-model");
        assert_eq!(options[1], "gpt-4o");
        assert_eq!(options[2], "o1-mini");
        assert!(options.iter().position(|id| id == "gpt-4-0125-preview").unwrap()
            < options.iter().position(|id| id == "llama-3").unwrap());
        let house = registry.get("house-model").unwrap();
        assert!(!house.streaming_supported);
        assert_eq!(house.display_name, "House (custom)");
    }

    #[test]
    fn unknown_models_fall_back_to_streaming_text() {
        let registry = ModelRegistry::default();
        let capability = registry.capability("my-local-model");
        assert_eq!(capability.modality, Modality::Text);
        assert!(capability.streaming_supported);
        assert_eq!(capability.max_tokens, None);
    }
}
