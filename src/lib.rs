//! Chat client core for a streaming conversational agent backend.
//!
//! Conversations live in a [`chat::ChatStore`]; replies stream in over
//! Server-Sent Events and are applied by a [`stream::ChatController`].

// Strict lints for the whole crate
#![deny(unsafe_code)] // No unsafe code
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)] // Public items must be documented
#![deny(non_camel_case_types)]
#![deny(unused_must_use)] // Results and Options must be handled
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![deny(overflowing_literals)]

// Clippy discipline
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)] // No unwrap()
#![deny(clippy::expect_used)] // No expect()
#![deny(clippy::panic)] // No panic!()
#![deny(clippy::print_stdout)] // Output goes through writers, never println!()
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::too_many_arguments)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

/// Backend HTTP client, wire types and errors.
pub mod api;
/// Conversations, messages and the in-memory store.
pub mod chat;
/// Terminal front-end.
pub mod repl;
/// Client configuration, preferences and the settings cache.
pub mod settings;
/// Entry helpers to start the chat client.
pub mod start_agent_chat;
/// Stream frames, sessions and the streaming controller.
pub mod stream;
/// Character-by-character reveal of replies.
pub mod typewriter;

#[cfg(test)]
pub(crate) mod testing;
