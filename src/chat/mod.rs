//! Conversation state for the chat client.
//!
//! - `ids`: conversation and message identifiers
//! - `types`: conversation/message model and title derivation
//! - `store`: the in-memory store with derived views and change notifications
//! - `export`: the downloadable export artifact

pub mod export;
pub mod ids;
pub mod store;
pub mod types;

pub use export::{EXPORT_SCHEMA_VERSION, ExportData, ExportError, read_export, write_export};
pub use ids::{ConversationId, MessageId};
pub use store::{ChatStore, Clock, SharedStore, StoreEvent, StoreStatus, SystemClock};
pub use types::{
    Conversation, DEFAULT_TITLE, Message, MessageType, NewMessage, Role, derive_title,
};
