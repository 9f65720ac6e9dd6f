pub mod chat_stream;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod image;
pub mod message;
pub mod registry;
pub mod router;
pub mod service;
pub mod sse;
pub mod state;
pub mod sync;
pub mod title;
pub mod tokens;
pub mod transport;
