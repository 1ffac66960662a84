//! Docchat - chat with an uploaded document over a streaming LLM backend
//!
//! A document is uploaded over HTTP, its text extracted and stored under the
//! caller's session token. A WebSocket opened with the same token picks up
//! that text as context; every message is turned into a prompt and the
//! backend's response is relayed back fragment by fragment.

pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod generation;
pub mod relay;
pub mod server;
pub mod session;
pub mod testing;

pub use error::DocchatError;
