//! Single-prompt "say" command

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::model_list::load_registry;
use crate::core::config::{Config, ConfigOrchestrator};
use crate::core::conversation::Conversation;
use crate::core::message::{ContentBlock, Message};
use crate::core::service::{ChatService, SubmitOutcome};
use crate::core::state::AppState;
use crate::core::sync::SyncStore;
use crate::core::transport::HttpTransport;

fn new_chat_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("chat-{millis}")
}

/// Builds the state a prompt is submitted against: the stored conversation
/// file when one is given, otherwise a fresh conversation.
fn prepare_state(
    config: &Config,
    store: Option<&SyncStore>,
    model: Option<String>,
    prompt: String,
) -> Result<AppState, Box<dyn Error>> {
    let state = match store.map(SyncStore::load).transpose()?.flatten() {
        Some(document) if !document.chats.is_empty() => document.into_state(),
        _ => AppState::new(vec![Conversation::new(new_chat_id(), config.chat_config())]),
    };

    let index = state.current_chat_index();
    state.update_chat(index, |conversation| {
        if let Some(model) = model {
            conversation.config.model = model;
        }
        conversation.push_message(Message::user(prompt));
    })?;
    Ok(state)
}

pub async fn run_say(
    orchestrator: &ConfigOrchestrator,
    prompt: Vec<String>,
    model: Option<String>,
    chat: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: chatpilot say <prompt>".into());
    }

    let config = orchestrator.load_with_cache()?;
    let client = reqwest::Client::new();
    let registry = load_registry(&client, &config).await;
    let pricing = registry.clone();

    let store = chat.map(SyncStore::new);
    let state = Arc::new(prepare_state(&config, store.as_ref(), model, prompt)?);

    let stopper = Arc::clone(&state);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.generation().stop();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        let mut printed = false;
        while let Some(fragment) = rx.recv().await {
            printed = true;
            let _ = write!(stdout, "{fragment}");
            let _ = stdout.flush();
        }
        printed
    });

    let service = ChatService::new(
        HttpTransport::new(client),
        registry,
        config.service_settings(),
    )
    .with_fragment_listener(tx);
    let outcome = service.submit(&state).await;
    drop(service);
    interrupt.abort();
    let streamed = printer.await.unwrap_or(false);
    debug!(?outcome, streamed, "say finished");

    if let Some(reply) = state
        .current_chat()
        .and_then(|chat| chat.last_message().cloned())
    {
        print_reply(&reply, streamed);
    }

    if config.count_total_tokens {
        state.with_usage(|ledger| {
            for (model, usage) in ledger.models() {
                eprintln!(
                    "📊 {model}: {} prompt + {} completion tokens, {} images",
                    usage.prompt_tokens, usage.completion_tokens, usage.images
                );
            }
            eprintln!("💰 Estimated cost: ${:.4}", ledger.total_cost(&pricing));
        });
    }

    if let Some(store) = &store {
        store.save_state(&state)?;
        debug!(path = %store.path().display(), "conversation saved");
    }

    match outcome {
        SubmitOutcome::Completed => Ok(()),
        SubmitOutcome::Cancelled => {
            eprintln!("⏹️  Generation stopped");
            Ok(())
        }
        SubmitOutcome::Skipped => Err("Another generation is already running".into()),
        SubmitOutcome::Failed(message) => Err(format!("❌ {message}").into()),
    }
}

fn print_reply(reply: &Message, streamed: bool) {
    if !reply.is_assistant() {
        return;
    }
    for block in &reply.content {
        match block {
            ContentBlock::Text { text } if !streamed && !text.is_empty() => print!("{text}"),
            ContentBlock::Image { image_url } => println!("🖼️  {}", image_url.url),
            ContentBlock::Text { .. } => {}
        }
    }
    println!();
}
