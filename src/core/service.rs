//! The submit operation.
//!
//! One call to [`ChatService::submit`] drives a whole generation for the
//! active conversation: claim the generation gate, append the assistant
//! placeholder, resolve the route, then either dispatch an image request or
//! trim history and run a streamed / single completion. Every failure on
//! that primary path ends up as one user-visible error. The gate is
//! released on every exit. Title generation runs afterwards and its
//! failures are only logged.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ChatRequest;
use crate::core::chat_stream::{StreamConsumer, StreamState};
use crate::core::completion::NonStreamInvoker;
use crate::core::conversation::{ChatConfig, Conversation};
use crate::core::error::ChatError;
use crate::core::image::ImageDispatcher;
use crate::core::message::Message;
use crate::core::registry::{Modality, ModelRegistry};
use crate::core::router::{ApiDefaults, ModelApiConfigs, RequestRouter};
use crate::core::state::AppState;
use crate::core::title::{build_title_prompt, TitleGenerator};
use crate::core::tokens::limit_message_tokens;
use crate::core::transport::CompletionTransport;

/// Settings the orchestrator reads on every submit.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub api: ApiDefaults,
    pub model_api_configs: ModelApiConfigs,
    pub title_model: Option<String>,
    pub auto_title: bool,
    pub count_total_tokens: bool,
    pub language: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            api: ApiDefaults::default(),
            model_api_configs: ModelApiConfigs::default(),
            title_model: None,
            auto_title: true,
            count_total_tokens: false,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Another generation was in flight; nothing was sent or changed.
    Skipped,
    Completed,
    Cancelled,
    /// The primary generation failed with this user-visible message.
    Failed(String),
}

struct Generated {
    model: String,
    modality: Modality,
    input: Vec<Arc<Message>>,
    finished: bool,
}

pub struct ChatService<T: CompletionTransport> {
    transport: T,
    registry: ModelRegistry,
    settings: ServiceSettings,
    fragments: Option<mpsc::UnboundedSender<String>>,
}

impl<T: CompletionTransport> ChatService<T> {
    pub fn new(transport: T, registry: ModelRegistry, settings: ServiceSettings) -> Self {
        Self {
            transport,
            registry,
            settings,
            fragments: None,
        }
    }

    /// Forwards each committed text fragment to `tx` as it arrives.
    pub fn with_fragment_listener(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.fragments = Some(tx);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub async fn submit(&self, state: &AppState) -> SubmitOutcome {
        let Some(guard) = state.generation().try_begin() else {
            info!("submit skipped: a generation is already in flight");
            return SubmitOutcome::Skipped;
        };
        let index = state.current_chat_index();
        state.set_error(None);

        let outcome = match self.generate(state, index, guard.cancel_token()).await {
            Ok(generated) => {
                if self.settings.count_total_tokens {
                    self.record_usage(state, index, &generated);
                }
                if generated.finished {
                    if generated.modality == Modality::Text {
                        self.generate_title(state, index).await;
                    }
                    SubmitOutcome::Completed
                } else {
                    SubmitOutcome::Cancelled
                }
            }
            Err(err) => {
                if err.is_remote() {
                    warn!(error = %err, "submit failed");
                } else {
                    info!(error = %err, "submit rejected");
                }
                let message = err.to_string();
                state.set_error(Some(message.clone()));
                SubmitOutcome::Failed(message)
            }
        };

        drop(guard);
        debug!(?outcome, "submit finished");
        outcome
    }

    async fn generate(
        &self,
        state: &AppState,
        index: usize,
        cancel: CancellationToken,
    ) -> Result<Generated, ChatError> {
        let conversation = state
            .chats()
            .get(index)
            .cloned()
            .ok_or(ChatError::NoActiveConversation(index))?;
        let history = conversation.messages.clone();
        let config = conversation.config.clone();

        state.append_message(index, Message::assistant_placeholder())?;

        if history.is_empty() {
            return Err(ChatError::NoMessages);
        }

        let capability = self.registry.capability(&config.model);
        let route = RequestRouter::new(&self.settings.api, &self.settings.model_api_configs)
            .resolve(&config.model, capability.modality)?;

        match capability.modality {
            Modality::Image => {
                let message = ImageDispatcher::new(&self.transport)
                    .dispatch(&route, &config.model, &history)
                    .await?;
                state.replace_last_message(index, message)?;
                Ok(Generated {
                    model: config.model,
                    modality: Modality::Image,
                    input: history,
                    finished: true,
                })
            }
            Modality::Text => {
                let limited = limit_message_tokens(&history, config.max_tokens, &config.model)?;
                let request = ChatRequest::new(&config, &limited, capability.streaming_supported);

                let finished = if capability.streaming_supported {
                    let mut stream = self.transport.open_stream(&route, &request).await?;
                    let mut consumer = StreamConsumer::new(cancel);
                    let mut committed = false;
                    let terminal = consumer
                        .consume(&mut stream, |fragment| {
                            committed = true;
                            self.commit(state, index, fragment)
                        })
                        .await?;
                    if terminal == StreamState::Done && !committed {
                        return Err(ChatError::MalformedResponse(
                            "stream finished without any content".into(),
                        ));
                    }
                    terminal == StreamState::Done
                } else {
                    let text = NonStreamInvoker::new(&self.transport)
                        .invoke(&route, &request)
                        .await?;
                    self.commit(state, index, &text)?;
                    true
                };

                Ok(Generated {
                    model: config.model,
                    modality: Modality::Text,
                    input: limited,
                    finished,
                })
            }
        }
    }

    fn commit(&self, state: &AppState, index: usize, fragment: &str) -> Result<(), ChatError> {
        state.append_to_generation_target(index, fragment)?;
        if let Some(tx) = &self.fragments {
            let _ = tx.send(fragment.to_string());
        }
        Ok(())
    }

    fn record_usage(&self, state: &AppState, index: usize, generated: &Generated) {
        let Some(response) = state
            .chats()
            .get(index)
            .and_then(|conversation| conversation.messages.last().cloned())
        else {
            return;
        };
        state.with_usage(|ledger| ledger.record(&generated.model, &generated.input, &response));
    }

    async fn generate_title(&self, state: &AppState, index: usize) {
        if !self.settings.auto_title {
            return;
        }
        let Some(conversation) = state.chats().get(index).cloned() else {
            return;
        };
        if conversation.title_set {
            return;
        }

        match self.request_title(&conversation).await {
            Ok((title, config, prompt)) => {
                info!(title = %title, "conversation titled");
                if self.settings.count_total_tokens {
                    let response = Message::assistant(title.clone());
                    state.with_usage(|ledger| ledger.record(&config.model, &prompt, &response));
                }
                if let Err(err) = state.set_title_once(index, title) {
                    warn!(error = %err, "could not store title");
                }
            }
            Err(err) => warn!(error = %err, "title generation failed"),
        }
    }

    async fn request_title(
        &self,
        conversation: &Conversation,
    ) -> Result<(String, ChatConfig, Vec<Arc<Message>>), ChatError> {
        let messages = &conversation.messages;
        let (user, assistant) = match messages.len() {
            len if len >= 2 => (&messages[len - 2], &messages[len - 1]),
            _ => {
                return Err(ChatError::TitleGeneration(
                    "conversation has no complete exchange".into(),
                ))
            }
        };

        let model = self
            .settings
            .title_model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| conversation.config.model.clone());
        let config = conversation.config.clone().with_model(model);
        let route = RequestRouter::new(&self.settings.api, &self.settings.model_api_configs)
            .resolve(&config.model, Modality::Text)
            .map_err(|err| ChatError::TitleGeneration(err.to_string()))?;
        let prompt = vec![Arc::new(build_title_prompt(
            user,
            assistant,
            &self.settings.language,
        ))];

        let title = TitleGenerator::new(&self.transport)
            .generate(&route, &config, &prompt)
            .await?;
        Ok((title, config, prompt))
    }
}
