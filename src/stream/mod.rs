//! Streaming ingest: frames, the per-request session and the controller.
//!
//! - `frame`: typed stream frames and event-name classification
//! - `session`: the per-request state machine applying frames to the store
//! - `controller`: owns the live pump task and the non-streaming send path

pub mod controller;
pub mod frame;
pub mod session;

pub use controller::ChatController;
pub use frame::{Frame, FrameStream};
pub use session::{CancelReason, FALLBACK_REPLY, STREAM_INTERRUPTED, SessionPhase, StreamSession};
