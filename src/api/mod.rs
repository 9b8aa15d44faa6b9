//! Agent backend API: HTTP client, wire types and errors.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AgentApi, ChatBackend, StreamTransport};
pub use error::{ApiError, ApiResult};
pub use types::{ChatRequest, ChatResponse, TypewriterConfig};
