//! Shared application state and the snapshot discipline around it.
//!
//! The conversation list is an immutable snapshot behind an `Arc`. Writers
//! go through [`AppState::update_chat`], which copies the outer list (a
//! vector of `Arc` pointers), copies-on-write only the conversation and
//! message being touched, and swaps the new snapshot in. Readers holding a
//! previous snapshot never observe a partial write.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::conversation::Conversation;
use crate::core::error::ChatError;
use crate::core::message::Message;
use crate::core::tokens::UsageLedger;

pub type ChatList = Vec<Arc<Conversation>>;
pub type ChatSnapshot = Arc<ChatList>;

pub struct AppState {
    chats: RwLock<ChatSnapshot>,
    current_chat_index: RwLock<usize>,
    generation: GenerationGate,
    error: RwLock<Option<String>>,
    usage: Mutex<UsageLedger>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl AppState {
    pub fn new(chats: Vec<Conversation>) -> Self {
        Self {
            chats: RwLock::new(Arc::new(chats.into_iter().map(Arc::new).collect())),
            current_chat_index: RwLock::new(0),
            generation: GenerationGate::default(),
            error: RwLock::new(None),
            usage: Mutex::new(UsageLedger::default()),
        }
    }

    pub fn chats(&self) -> ChatSnapshot {
        Arc::clone(&self.chats.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn current_chat_index(&self) -> usize {
        *self
            .current_chat_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_current_chat_index(&self, index: usize) {
        *self
            .current_chat_index
            .write()
            .unwrap_or_else(PoisonError::into_inner) = index;
    }

    pub fn current_chat(&self) -> Option<Arc<Conversation>> {
        self.chats().get(self.current_chat_index()).cloned()
    }

    /// Applies `mutate` to a private copy of conversation `index` and
    /// publishes the result as the new snapshot.
    pub fn update_chat<R>(
        &self,
        index: usize,
        mutate: impl FnOnce(&mut Conversation) -> R,
    ) -> Result<R, ChatError> {
        let mut guard = self.chats.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: ChatList = guard.as_ref().clone();
        let conversation = next
            .get_mut(index)
            .ok_or(ChatError::NoActiveConversation(index))?;
        let result = mutate(Arc::make_mut(conversation));
        *guard = Arc::new(next);
        Ok(result)
    }

    /// Adds a conversation and returns its index.
    pub fn push_chat(&self, conversation: Conversation) -> usize {
        let mut guard = self.chats.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: ChatList = guard.as_ref().clone();
        next.push(Arc::new(conversation));
        let index = next.len() - 1;
        *guard = Arc::new(next);
        index
    }

    pub fn append_message(&self, index: usize, message: Message) -> Result<(), ChatError> {
        self.update_chat(index, |conversation| conversation.push_message(message))
    }

    /// Appends a generated fragment to the trailing content block of the
    /// in-flight assistant message.
    pub fn append_to_generation_target(
        &self,
        index: usize,
        fragment: &str,
    ) -> Result<(), ChatError> {
        if fragment.is_empty() {
            return Ok(());
        }
        self.update_chat(index, |conversation| match conversation.last_message_mut() {
            Some(message) => {
                message.append_text(fragment);
                Ok(())
            }
            None => Err(ChatError::NoMessages),
        })?
    }

    pub fn replace_last_message(&self, index: usize, message: Message) -> Result<(), ChatError> {
        self.update_chat(index, |conversation| {
            match conversation.messages.last_mut() {
                Some(last) => *last = Arc::new(message),
                None => conversation.push_message(message),
            }
        })
    }

    /// Sets the title only if none was set yet. Returns whether it changed.
    pub fn set_title_once(&self, index: usize, title: String) -> Result<bool, ChatError> {
        self.update_chat(index, |conversation| {
            if conversation.title_set {
                return false;
            }
            conversation.title = title;
            conversation.title_set = true;
            true
        })
    }

    pub fn generation(&self) -> &GenerationGate {
        &self.generation
    }

    pub fn error(&self) -> Option<String> {
        self.error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_error(&self, message: Option<String>) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = message;
    }

    pub fn with_usage<R>(&self, f: impl FnOnce(&mut UsageLedger) -> R) -> R {
        f(&mut self.usage.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

struct ActiveGeneration {
    id: u64,
    cancel: CancellationToken,
}

/// The process-wide "generating" flag. At most one generation holds the
/// gate; stopping it cancels the token the stream consumer polls.
#[derive(Default)]
pub struct GenerationGate {
    active: Mutex<Option<ActiveGeneration>>,
    next_id: Mutex<u64>,
}

impl GenerationGate {
    pub fn is_generating(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Claims the gate, or returns `None` if a generation is in flight.
    pub fn try_begin(&self) -> Option<GenerationGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return None;
        }

        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next_id += 1;
            *next_id
        };
        let cancel = CancellationToken::new();
        *active = Some(ActiveGeneration {
            id,
            cancel: cancel.clone(),
        });
        debug!(generation = id, "generation started");

        Some(GenerationGuard {
            gate: self,
            id,
            cancel,
        })
    }

    /// Flips the flag to false and cancels the in-flight generation.
    pub fn stop(&self) {
        if let Some(active) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            debug!(generation = active.id, "generation stopped");
            active.cancel.cancel();
        }
    }
}

/// Held for the duration of one submit. Dropping it resets the flag unless
/// the gate was already stopped and claimed by a newer generation.
pub struct GenerationGuard<'a> {
    gate: &'a GenerationGate,
    id: u64,
    cancel: CancellationToken,
}

impl GenerationGuard<'_> {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        let mut active = self
            .gate
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|current| current.id == self.id) {
            *active = None;
            debug!(generation = self.id, "generation finished");
        }
    }
}
