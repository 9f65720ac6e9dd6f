//! Chatpilot is a request-orchestration engine for chatting with remote text
//! and image LLM APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state, the model registry, per-model request
//!   routing, streaming consumption, image dispatch, title generation, and
//!   the [`core::service::ChatService::submit`] operation that ties them
//!   together.
//! - [`api`] defines the chat, image, and models-document payloads exchanged
//!   with providers.
//! - [`cli`] parses command-line arguments and runs one-shot commands.
//! - [`utils`] holds auth-header, endpoint, and logging helpers.
//!
//! The binary crate (`src/main.rs`) routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
