use crate::core::config::data::Config;

fn mask_key(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if key.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("****{visible}")
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.api_endpoint {
            Some(endpoint) => println!("  api-endpoint: {endpoint}"),
            None => println!("  api-endpoint: (unset)"),
        }
        match &self.api_key {
            Some(key) => println!("  api-key: {}", mask_key(key)),
            None => println!("  api-key: (unset)"),
        }
        match &self.api_version {
            Some(version) => println!("  api-version: {version}"),
            None => println!("  api-version: (unset)"),
        }
        match &self.title_model {
            Some(model) => println!("  title-model: {model}"),
            None => println!("  title-model: (conversation model)"),
        }
        println!("  auto-title: {}", on_off(self.auto_title));
        println!("  count-total-tokens: {}", on_off(self.count_total_tokens));
        println!("  language: {}", self.language());
        match &self.models_url {
            Some(url) => println!("  models-url: {url}"),
            None => println!("  models-url: (unset)"),
        }
        let chat = self.chat_config();
        println!("  default-model: {}", chat.model);
        println!("  max-tokens: {}", chat.max_tokens);
        if self.model_api_configs.is_empty() {
            println!("  model-api-configs: (none set)");
        } else {
            println!("  model-api-configs:");
            for entry in self.model_api_configs.iter() {
                println!("    {}: {}", entry.model_id, entry.endpoint);
            }
        }
    }
}
