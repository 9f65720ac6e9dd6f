use std::path::Path;

use serde::{Deserialize, Serialize};

/// Models listing in the OpenRouter `/models` shape.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModelsDocument {
    #[serde(default)]
    pub data: Vec<ModelData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context_length: usize,
    #[serde(default)]
    pub pricing: ModelPricing,
    #[serde(default)]
    pub architecture: ModelArchitecture,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt: Option<String>,
    pub completion: Option<String>,
    pub image: Option<String>,
    pub request: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub modality: String,
    #[serde(default)]
    pub tokenizer: Option<String>,
}

impl Default for ModelArchitecture {
    fn default() -> Self {
        Self {
            modality: "text->text".to_string(),
            tokenizer: None,
        }
    }
}

impl ModelData {
    pub fn image_model(id: &str, name: &str, context_length: usize, image_price: &str) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
            context_length,
            pricing: ModelPricing {
                prompt: Some("0".to_string()),
                completion: Some("0".to_string()),
                image: Some(image_price.to_string()),
                request: Some("0".to_string()),
            },
            architecture: ModelArchitecture {
                modality: "text->image".to_string(),
                tokenizer: Some("none".to_string()),
            },
        }
    }

    /// Model id without any vendor prefix (`openai/gpt-4o` → `gpt-4o`).
    pub fn short_id(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

/// Loads the models document from an `http(s)` URL or a local file path.
pub async fn fetch_models(
    client: &reqwest::Client,
    source: &str,
) -> Result<ModelsDocument, Box<dyn std::error::Error>> {
    if !(source.starts_with("http://") || source.starts_with("https://")) {
        return load_models_file(Path::new(source));
    }

    let response = client
        .get(source)
        .header("Content-Type", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("Models request failed with status {status}: {error_text}").into());
    }

    let document = response.json::<ModelsDocument>().await?;
    Ok(document)
}

pub fn load_models_file(path: &Path) -> Result<ModelsDocument, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| format!("Failed to read models file {}: {err}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}
