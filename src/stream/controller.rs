//! Streaming session controller.
//!
//! The controller owns at most one live stream. Each stream runs as a pump task
//! that pulls frames from the transport and applies them to the shared store
//! through a [`StreamSession`]. Starting a new stream cancels the old pump and
//! waits for it to exit before the replacement opens.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::client::{ChatBackend, StreamTransport};
use crate::api::error::ApiResult;
use crate::api::types::ChatRequest;
use crate::chat::ids::{ConversationId, MessageId};
use crate::chat::store::SharedStore;
use crate::chat::types::NewMessage;
use crate::stream::frame::FrameStream;
use crate::stream::session::{CancelReason, SessionPhase, StreamSession};

struct LiveStream {
    target_id: MessageId,
    handle: JoinHandle<SessionPhase>,
    cancel: oneshot::Sender<CancelReason>,
    finished: watch::Receiver<Option<SessionPhase>>,
}

/// Drives chat requests against the backend and writes results into the store.
pub struct ChatController {
    store: SharedStore,
    backend: Arc<dyn ChatBackend>,
    transport: Arc<dyn StreamTransport>,
    live: Mutex<Option<LiveStream>>,
}

impl ChatController {
    /// Build a controller over a shared store.
    #[must_use]
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn ChatBackend>,
        transport: Arc<dyn StreamTransport>,
    ) -> Self {
        Self {
            store,
            backend,
            transport,
            live: Mutex::new(None),
        }
    }

    /// The store this controller writes to.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Send a message and wait for the whole reply.
    ///
    /// Failures are recorded in the store's error state; nothing is returned.
    pub async fn send(&self, content: &str, conversation_id: Option<ConversationId>) {
        let target = {
            let mut store = self.store.lock().await;
            store.set_loading(true);
            store.set_error(None);
            let target = store.resolve_target(conversation_id);
            store.append_message(NewMessage::user(target, content));
            target
        };

        let request = ChatRequest::new(content, Some(target));
        let result = self.backend.chat(&request).await;

        let mut store = self.store.lock().await;
        match result {
            Ok(response) => {
                debug!(conversation = %target, "Chat reply received");
                store.append_message(NewMessage::assistant(target, response.result));
            }
            Err(err) => {
                warn!(error = %err, conversation = %target, "Chat request failed");
                store.set_error(Some(err.user_message()));
            }
        }
        store.set_loading(false);
    }

    /// Start streaming a reply, superseding any live stream.
    ///
    /// Returns the id of the assistant message the stream fills.
    pub async fn send_stream(
        &self,
        content: &str,
        conversation_id: Option<ConversationId>,
    ) -> MessageId {
        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            if previous.handle.is_finished() {
                debug!(message = %previous.target_id, "Releasing finished chat stream");
            } else {
                info!(message = %previous.target_id, "Superseding live chat stream");
            }
            close(previous, CancelReason::Superseded).await;
        }

        let session = {
            let mut store = self.store.lock().await;
            StreamSession::open(&mut store, content, conversation_id)
        };
        let target_id = session.target_id();
        let request = ChatRequest::new(content, Some(session.conversation_id()));
        let frames = self.transport.open(&request);

        let (cancel, cancelled) = oneshot::channel();
        let (done, finished) = watch::channel(None);
        let pump = pump(Arc::clone(&self.store), session, frames, cancelled);
        let handle = tokio::spawn(async move {
            let phase = pump.await;
            done.send_replace(Some(phase));
            phase
        });
        *live = Some(LiveStream {
            target_id,
            handle,
            cancel,
            finished,
        });
        target_id
    }

    /// Close the live stream, if any. The in-flight message is not finalized.
    pub async fn stop(&self) {
        let previous = self.live.lock().await.take();
        if let Some(previous) = previous {
            info!(message = %previous.target_id, "Stopping live chat stream");
            close(previous, CancelReason::Stopped).await;
        }
        self.store.lock().await.set_connecting(false);
    }

    /// A stream is still pumping.
    pub async fn is_streaming(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .is_some_and(|stream| !stream.handle.is_finished())
    }

    /// Wait for the live stream to reach a terminal phase.
    ///
    /// The stream stays owned by the controller while waiting, so `stop` and
    /// `send_stream` still reach it; the waiter then sees `Stopped` or
    /// `Superseded`. Returns `None` when no stream was started.
    pub async fn wait_for_stream(&self) -> Option<SessionPhase> {
        let mut finished = self.live.lock().await.as_ref()?.finished.clone();
        let phase = finished.wait_for(Option::is_some).await.map(|phase| *phase);
        match phase {
            Ok(phase) => phase,
            Err(_) => {
                warn!("Chat stream task ended without a phase");
                None
            }
        }
    }
}

async fn close(stream: LiveStream, reason: CancelReason) {
    // The pump may already be done; then the receiver is gone.
    let _ = stream.cancel.send(reason);
    match stream.handle.await {
        Ok(phase) => debug!(message = %stream.target_id, ?phase, "Chat stream task exited"),
        Err(err) => warn!(error = %err, "Chat stream task failed"),
    }
}

async fn pump(
    store: SharedStore,
    mut session: StreamSession,
    frames: ApiResult<FrameStream>,
    mut cancelled: oneshot::Receiver<CancelReason>,
) -> SessionPhase {
    let mut frames = match frames {
        Ok(frames) => frames,
        Err(err) => return session.fail_to_open(&mut *store.lock().await, &err),
    };

    loop {
        let next = tokio::select! {
            biased;
            reason = &mut cancelled => {
                // A dropped controller counts as a stop.
                let reason = reason.unwrap_or(CancelReason::Stopped);
                return session.cancel(&mut *store.lock().await, reason);
            }
            frame = frames.next() => frame,
        };

        let mut guard = store.lock().await;
        let phase = match next {
            Some(frame) => session.apply(&mut guard, frame),
            None => session.end_of_stream(&mut guard),
        };
        if phase.is_terminal() {
            return phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::ChatStore;
    use crate::chat::types::Role;
    use crate::stream::frame::Frame;
    use crate::stream::session::{FALLBACK_REPLY, STREAM_INTERRUPTED};
    use crate::testing::{MockBackend, ScriptedTransport, wait_until};

    fn controller(backend: MockBackend) -> (ChatController, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let controller = ChatController::new(
            ChatStore::new().into_shared(),
            Arc::new(backend),
            transport.clone(),
        );
        (controller, transport)
    }

    fn content(text: &str) -> Frame {
        Frame::Content(text.to_string())
    }

    #[tokio::test]
    async fn test_send_creates_conversation_and_reply() {
        let (controller, _) = controller(MockBackend::replying("Hi! How can I help?"));
        controller.send("Hello", None).await;

        let store = controller.store();
        let store = store.lock().await;
        assert_eq!(store.conversation_count(), 1);
        let conversation = store.current_conversation().unwrap();
        assert_eq!(conversation.title, "Hello");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].content, "Hello");
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert_eq!(conversation.messages[1].content, "Hi! How can I help?");
        assert!(conversation.messages[1].is_complete);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_send_failure_records_error_only() {
        let (controller, _) = controller(MockBackend::failing(500));
        controller.send("Hello", None).await;

        let store = controller.store();
        let store = store.lock().await;
        assert_eq!(store.current_messages().len(), 1);
        assert_eq!(
            store.error(),
            Some("Server internal error, please try again later")
        );
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_stream_content_then_close() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let tx = transport.push();
        for frame in [Frame::Open, content("He"), content("llo"), Frame::EndOfContent, Frame::Close] {
            tx.unbounded_send(frame).unwrap();
        }

        let target = controller.send_stream("Say hello", None).await;
        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Closed));

        let store = controller.store();
        let store = store.lock().await;
        let reply = store.message(&target).unwrap();
        assert_eq!(reply.content, "Hello");
        assert!(reply.is_complete);
        assert!(!reply.is_streaming);
        assert_eq!(store.error(), None);
        assert!(!store.is_connecting());

        let opened = transport.opened();
        assert_eq!(opened[0].message, "Say hello");
        assert_eq!(opened[0].conversation_id, Some(reply.conversation_id));
    }

    #[tokio::test]
    async fn test_stream_error_after_handshake() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let tx = transport.push();
        for frame in [Frame::Open, content("Hi"), Frame::TransportError] {
            tx.unbounded_send(frame).unwrap();
        }

        let target = controller.send_stream("hey", None).await;
        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Errored));

        let store = controller.store();
        let store = store.lock().await;
        let reply = store.message(&target).unwrap();
        assert_eq!(reply.content, "Hi");
        assert!(reply.is_complete);
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn test_stream_error_before_handshake() {
        let (controller, transport) = controller(MockBackend::replying(""));
        transport.push().unbounded_send(Frame::TransportError).unwrap();

        let target = controller.send_stream("hey", None).await;
        controller.wait_for_stream().await;

        let store = controller.store();
        let store = store.lock().await;
        let reply = store.message(&target).unwrap();
        assert_eq!(reply.content, FALLBACK_REPLY);
        assert!(reply.is_complete);
        assert_eq!(store.error(), Some(STREAM_INTERRUPTED));
        assert!(!store.is_connecting());
    }

    #[tokio::test]
    async fn test_transport_that_cannot_open() {
        let (controller, _) = controller(MockBackend::replying(""));

        let target = controller.send_stream("hey", None).await;
        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Errored));

        let store = controller.store();
        let store = store.lock().await;
        assert_eq!(store.message(&target).unwrap().content, FALLBACK_REPLY);
        assert_eq!(store.error(), Some(STREAM_INTERRUPTED));
    }

    #[tokio::test]
    async fn test_stream_ending_without_close() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let tx = transport.push();
        tx.unbounded_send(Frame::Open).unwrap();
        tx.unbounded_send(content("Hi")).unwrap();
        drop(tx);

        let target = controller.send_stream("hey", None).await;
        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Errored));

        let store = controller.store();
        let store = store.lock().await;
        let reply = store.message(&target).unwrap();
        assert_eq!(reply.content, "Hi");
        assert!(reply.is_complete);
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn test_second_stream_supersedes_first() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let store = controller.store();

        let first_tx = transport.push();
        first_tx.unbounded_send(Frame::Open).unwrap();
        first_tx.unbounded_send(content("A")).unwrap();
        let first = controller.send_stream("one", None).await;
        wait_until(&store, |s| s.message(&first).is_some_and(|m| m.content == "A")).await;

        let second_tx = transport.push();
        let second = controller.send_stream("two", None).await;
        for frame in [Frame::Open, content("B"), Frame::Close] {
            second_tx.unbounded_send(frame).unwrap();
        }
        // Late frames on the old stream go nowhere.
        assert!(first_tx.unbounded_send(content("lost")).is_err());

        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Closed));

        let store = store.lock().await;
        let old = store.message(&first).unwrap();
        assert_eq!(old.content, "A");
        assert!(old.is_streaming);
        assert!(!old.is_complete);

        let new = store.message(&second).unwrap();
        assert_eq!(new.content, "B");
        assert!(new.is_complete);
        assert_eq!(old.conversation_id, new.conversation_id);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_keeps_message() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let store = controller.store();
        let tx = transport.push();
        tx.unbounded_send(Frame::Open).unwrap();
        tx.unbounded_send(content("partial")).unwrap();

        let target = controller.send_stream("hey", None).await;
        wait_until(&store, |s| s.message(&target).is_some_and(|m| m.content == "partial")).await;
        assert!(controller.is_streaming().await);

        controller.stop().await;
        controller.stop().await;
        assert!(!controller.is_streaming().await);
        assert_eq!(controller.wait_for_stream().await, None);

        let store = store.lock().await;
        let reply = store.message(&target).unwrap();
        assert_eq!(reply.content, "partial");
        assert!(reply.is_streaming);
        assert!(!store.is_connecting());
    }

    #[tokio::test]
    async fn test_stream_into_explicit_conversation() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let (first, second) = {
            let store = controller.store();
            let mut store = store.lock().await;
            let first = store.create_conversation(None);
            let second = store.create_conversation(None);
            (first, second)
        };

        let tx = transport.push();
        for frame in [Frame::Open, Frame::ToolActivity("Searching".to_string()), content("ok"), Frame::Close] {
            tx.unbounded_send(frame).unwrap();
        }
        controller.send_stream("hey", Some(first)).await;
        controller.wait_for_stream().await;

        let store = controller.store();
        let store = store.lock().await;
        assert_eq!(store.current_conversation_id(), Some(second));
        let roles: Vec<Role> = store
            .conversation(&first)
            .unwrap()
            .messages
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::ToolActivity]);
        assert!(store.conversation(&second).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_waiting_keeps_stream_reachable() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let controller = Arc::new(controller);
        let store = controller.store();

        let first_tx = transport.push();
        first_tx.unbounded_send(Frame::Open).unwrap();
        let first = controller.send_stream("one", None).await;
        let first_waiter = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.wait_for_stream().await }
        });
        tokio::task::yield_now().await;

        let second_tx = transport.push();
        second_tx.unbounded_send(Frame::Open).unwrap();
        let second = controller.send_stream("two", None).await;
        assert_eq!(first_waiter.await.unwrap(), Some(SessionPhase::Superseded));
        assert!(first_tx.unbounded_send(content("leak")).is_err());

        let second_waiter = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.wait_for_stream().await }
        });
        tokio::task::yield_now().await;

        controller.stop().await;
        assert_eq!(second_waiter.await.unwrap(), Some(SessionPhase::Stopped));
        assert!(second_tx.unbounded_send(content("leak")).is_err());
        assert!(!controller.is_streaming().await);

        let store = store.lock().await;
        assert_eq!(store.message(&first).unwrap().content, "");
        assert_eq!(store.message(&second).unwrap().content, "");
    }

    #[tokio::test]
    async fn test_wait_then_send_releases_finished_stream() {
        let (controller, transport) = controller(MockBackend::replying(""));
        let tx = transport.push();
        for frame in [Frame::Open, content("done"), Frame::Close] {
            tx.unbounded_send(frame).unwrap();
        }
        let first = controller.send_stream("one", None).await;
        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Closed));
        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Closed));

        transport.push().unbounded_send(Frame::Close).unwrap();
        controller.send_stream("two", None).await;
        assert_eq!(controller.wait_for_stream().await, Some(SessionPhase::Closed));

        let store = controller.store();
        let store = store.lock().await;
        let old = store.message(&first).unwrap();
        assert_eq!(old.content, "done");
        assert!(old.is_complete);
    }
}
