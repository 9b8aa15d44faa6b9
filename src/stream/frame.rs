//! Typed frames delivered by a chat event stream.

use std::pin::Pin;

use futures::Stream;
use tracing::debug;

/// Data value marking the end of content deltas.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Event name of plain content frames.
pub const MESSAGE_EVENT: &str = "message";

/// Event name of tool-activity narration frames.
pub const TOOL_ACTIVITY_EVENT: &str = "tool_thinking";

/// Event name of the graceful close signal.
pub const CLOSE_EVENT: &str = "close";

/// One frame of a chat stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// The transport handshake succeeded.
    Open,
    /// A content delta for the assistant reply.
    Content(String),
    /// The sentinel saying no more deltas follow.
    EndOfContent,
    /// Narration of a tool call.
    ToolActivity(String),
    /// The server closed the stream on purpose.
    Close,
    /// The transport failed or ended without a close signal.
    TransportError,
}

impl Frame {
    /// Classify a named server-sent event.
    ///
    /// Returns `None` for frames that carry nothing to apply (empty payloads,
    /// unknown event names).
    #[must_use]
    pub fn classify(event: &str, data: String) -> Option<Self> {
        match event {
            "" | MESSAGE_EVENT => {
                if data == DONE_SENTINEL {
                    Some(Self::EndOfContent)
                } else if data.is_empty() {
                    None
                } else {
                    Some(Self::Content(data))
                }
            }
            TOOL_ACTIVITY_EVENT => (!data.is_empty()).then_some(Self::ToolActivity(data)),
            CLOSE_EVENT => Some(Self::Close),
            other => {
                debug!(event = other, "Ignoring unknown stream event");
                None
            }
        }
    }
}

/// Lazy, finite-until-closed sequence of frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;
