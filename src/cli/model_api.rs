//! `model-api` subcommands: per-model endpoint and key overrides.

use std::error::Error;

use crate::core::config::ConfigOrchestrator;
use crate::core::router::ModelApiConfig;

pub fn add_model_api(
    orchestrator: &ConfigOrchestrator,
    model_id: String,
    endpoint: String,
    key: Option<String>,
    version: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        return Err("Endpoint must not be empty".into());
    }

    let entry = ModelApiConfig::new(
        model_id.clone(),
        endpoint.clone(),
        key.unwrap_or_default(),
        version,
    );
    let replaced = orchestrator.mutate(|config| {
        let replaced = config.get_model_api_config(&model_id).is_some();
        config.add_model_api_config(entry);
        Ok(replaced)
    })?;

    if replaced {
        println!("✅ Updated endpoint for {model_id}: {endpoint}");
    } else {
        println!("✅ Added endpoint for {model_id}: {endpoint}");
    }
    Ok(())
}

pub fn remove_model_api(
    orchestrator: &ConfigOrchestrator,
    model_id: &str,
) -> Result<(), Box<dyn Error>> {
    let removed = orchestrator.mutate(|config| Ok(config.remove_model_api_config(model_id)))?;
    if removed {
        println!("✅ Removed endpoint override for {model_id}");
    } else {
        println!("No endpoint override configured for {model_id}");
    }
    Ok(())
}

pub fn list_model_apis(orchestrator: &ConfigOrchestrator) -> Result<(), Box<dyn Error>> {
    let config = orchestrator.load_with_cache()?;
    let entries = config.list_model_api_configs();
    if entries.is_empty() {
        println!("No per-model endpoints configured.");
        return Ok(());
    }

    println!("🔀 Per-model endpoints");
    for entry in entries {
        let key = if entry.key.is_empty() {
            "global key"
        } else {
            "own key"
        };
        match &entry.version {
            Some(version) => println!(
                "  • {} → {} ({key}, api-version {version})",
                entry.model_id, entry.endpoint
            ),
            None => println!("  • {} → {} ({key})", entry.model_id, entry.endpoint),
        }
    }
    Ok(())
}
