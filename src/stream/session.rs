//! Per-request streaming state machine.
//!
//! A [`StreamSession`] owns the accumulator and the id of the assistant message
//! it fills. It never reads content back from the store: every frame is applied
//! to the accumulator first and the result is written through.

use tracing::{debug, info, warn};

use crate::api::error::ApiError;
use crate::chat::ids::{ConversationId, MessageId};
use crate::chat::store::ChatStore;
use crate::chat::types::NewMessage;
use crate::stream::frame::Frame;

/// Reply written when a stream fails before any content arrived.
pub const FALLBACK_REPLY: &str = "Connection error, please try again.";

/// Error shown when a stream fails during its handshake.
pub const STREAM_INTERRUPTED: &str = "Connection interrupted, please try again.";

/// Lifecycle of one streaming request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport requested, handshake pending.
    Opening,
    /// Handshake done, frames flowing.
    Streaming,
    /// The server closed the stream normally.
    Closed,
    /// The transport failed.
    Errored,
    /// Replaced by a newer stream.
    Superseded,
    /// Stopped by the user.
    Stopped,
}

impl SessionPhase {
    /// No further frame changes anything.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Opening | Self::Streaming)
    }
}

/// Why a live stream was torn down from outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// A new stream started.
    Superseded,
    /// `stop()` was called.
    Stopped,
}

/// State of one streaming request.
#[derive(Debug)]
pub struct StreamSession {
    conversation_id: ConversationId,
    target_id: MessageId,
    accumulator: String,
    phase: SessionPhase,
}

impl StreamSession {
    /// Append the user message and the streaming placeholder, then enter `Opening`.
    pub fn open(store: &mut ChatStore, content: &str, requested: Option<ConversationId>) -> Self {
        let conversation_id = store.resolve_target(requested);
        store.append_message(NewMessage::user(conversation_id, content));
        let placeholder = store.append_message(NewMessage::assistant_placeholder(conversation_id));
        store.set_connecting(true);
        store.set_error(None);

        info!(
            conversation = %conversation_id,
            message = %placeholder.id,
            "Opening chat stream session"
        );

        Self {
            conversation_id,
            target_id: placeholder.id,
            accumulator: String::new(),
            phase: SessionPhase::Opening,
        }
    }

    /// Conversation the session writes to.
    #[must_use]
    pub const fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Assistant message being filled.
    #[must_use]
    pub const fn target_id(&self) -> MessageId {
        self.target_id
    }

    /// Text received so far.
    #[must_use]
    pub fn accumulated(&self) -> &str {
        &self.accumulator
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The session reached a terminal phase.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Apply one frame and return the resulting phase.
    ///
    /// Frames arriving after a terminal phase are ignored.
    pub fn apply(&mut self, store: &mut ChatStore, frame: Frame) -> SessionPhase {
        if self.is_terminal() {
            debug!(phase = ?self.phase, "Frame after terminal phase ignored");
            return self.phase;
        }

        match frame {
            Frame::Open => {
                if self.phase == SessionPhase::Opening {
                    self.phase = SessionPhase::Streaming;
                    store.set_connecting(false);
                    debug!(message = %self.target_id, "Chat stream open");
                }
            }
            Frame::Content(delta) => {
                if !delta.is_empty() {
                    self.accumulator.push_str(&delta);
                    store.mutate_message_content(&self.target_id, &self.accumulator, false);
                }
            }
            Frame::EndOfContent => {
                debug!(message = %self.target_id, "End of content");
            }
            Frame::ToolActivity(narration) => {
                if !narration.is_empty() {
                    store.append_tool_activity(self.conversation_id, narration);
                }
            }
            Frame::Close => {
                store.mutate_message_content(&self.target_id, &self.accumulator, true);
                store.set_connecting(false);
                store.set_error(None);
                self.phase = SessionPhase::Closed;
                info!(
                    message = %self.target_id,
                    chars = self.accumulator.chars().count(),
                    "Chat stream closed"
                );
            }
            Frame::TransportError => self.fail(store),
        }
        self.phase
    }

    /// The frame source ran dry without a close signal.
    pub fn end_of_stream(&mut self, store: &mut ChatStore) -> SessionPhase {
        debug!(message = %self.target_id, "Chat stream ended without close");
        self.apply(store, Frame::TransportError)
    }

    /// The transport could not be opened at all.
    pub fn fail_to_open(&mut self, store: &mut ChatStore, err: &ApiError) -> SessionPhase {
        warn!(error = %err, message = %self.target_id, "Chat stream could not be opened");
        self.apply(store, Frame::TransportError)
    }

    /// Tear the session down from outside. The target message is left as is.
    pub fn cancel(&mut self, store: &mut ChatStore, reason: CancelReason) -> SessionPhase {
        if self.is_terminal() {
            return self.phase;
        }
        store.set_connecting(false);
        self.phase = match reason {
            CancelReason::Superseded => SessionPhase::Superseded,
            CancelReason::Stopped => SessionPhase::Stopped,
        };
        info!(message = %self.target_id, phase = ?self.phase, "Chat stream cancelled");
        self.phase
    }

    fn fail(&mut self, store: &mut ChatStore) {
        let content = if self.accumulator.is_empty() {
            FALLBACK_REPLY
        } else {
            self.accumulator.as_str()
        };
        store.mutate_message_content(&self.target_id, content, true);
        store.set_connecting(false);

        // Only a failed handshake is surfaced; a broken stream just finalizes.
        if self.phase == SessionPhase::Opening {
            store.set_error(Some(STREAM_INTERRUPTED.to_string()));
        }
        warn!(message = %self.target_id, phase = ?self.phase, "Chat stream errored");
        self.phase = SessionPhase::Errored;
    }
}
