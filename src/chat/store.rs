//! In-memory conversation store.
//!
//! The store owns every conversation and message. Mutators are plain `&mut self`
//! methods that never fail; each one publishes a [`StoreEvent`] once the state
//! change is complete so views can re-read what they display.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::chat::export::{EXPORT_SCHEMA_VERSION, ExportData};
use crate::chat::ids::{ConversationId, MessageId};
use crate::chat::types::{
    Conversation, DEFAULT_TITLE, Message, NewMessage, Role, derive_title,
};

/// Capacity of the change-notification channel.
const EVENT_BUFFER_CAPACITY: usize = 256;

/// Store shared between the controller, its pump task and the views.
pub type SharedStore = Arc<Mutex<ChatStore>>;

/// Source of timestamps for the store.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Change notification published after a mutator returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// A conversation was created.
    ConversationCreated(ConversationId),
    /// A conversation title changed.
    ConversationRenamed(ConversationId),
    /// A conversation was removed.
    ConversationDeleted(ConversationId),
    /// The current conversation selector changed.
    CurrentChanged(Option<ConversationId>),
    /// A message was appended.
    MessageAppended {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// New message.
        message_id: MessageId,
    },
    /// A message's content or completion flags changed.
    MessageUpdated {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// Updated message.
        message_id: MessageId,
        /// Whether the message is now final.
        is_complete: bool,
    },
    /// Loading, connecting or error state changed.
    StatusChanged,
    /// Every conversation was removed.
    Cleared,
    /// Conversations were loaded from an export artifact.
    Imported {
        /// Number of conversations imported.
        conversations: usize,
    },
}

/// Store-wide request status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStatus {
    /// A non-streaming request is in flight.
    pub loading: bool,
    /// A stream handshake is in flight.
    pub connecting: bool,
    /// Last user-visible error.
    pub error: Option<String>,
}

/// Conversation store with an id index for O(1) message mutation.
pub struct ChatStore {
    conversations: HashMap<ConversationId, Conversation>,
    /// Insertion order, used to break ties when sorting by `updated_at`.
    order: Vec<ConversationId>,
    message_index: HashMap<MessageId, (ConversationId, usize)>,
    explicit_titles: HashSet<ConversationId>,
    current: Option<ConversationId>,
    status: StoreStatus,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    /// Create an empty store using the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (events, _receiver) = broadcast::channel(EVENT_BUFFER_CAPACITY);
        Self {
            conversations: HashMap::new(),
            order: Vec::new(),
            message_index: HashMap::new(),
            explicit_titles: HashSet::new(),
            current: None,
            status: StoreStatus::default(),
            clock,
            events,
        }
    }

    /// Wrap the store for sharing with a controller.
    #[must_use]
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscriber is a normal situation.
        let _ = self.events.send(event);
    }

    // ===== Conversations ====================================================

    /// Create a conversation, make it current and return its id.
    pub fn create_conversation(&mut self, title: Option<&str>) -> ConversationId {
        let id = ConversationId::new();
        let now = self.clock.now();
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(explicit) => {
                self.explicit_titles.insert(id);
                explicit.to_string()
            }
            None => DEFAULT_TITLE.to_string(),
        };

        self.conversations
            .insert(id, Conversation::new(id, title, now));
        self.order.push(id);
        self.current = Some(id);

        info!(conversation = %id, "Created conversation");
        self.publish(StoreEvent::ConversationCreated(id));
        self.publish(StoreEvent::CurrentChanged(self.current));
        id
    }

    /// Select a conversation; unknown ids are ignored.
    pub fn switch_conversation(&mut self, id: &ConversationId) {
        if !self.conversations.contains_key(id) {
            debug!(conversation = %id, "Switch ignored, conversation not found");
            return;
        }
        self.current = Some(*id);
        debug!(conversation = %id, "Switched conversation");
        self.publish(StoreEvent::CurrentChanged(self.current));
    }

    /// Set an explicit title; it will not be replaced by a derived one.
    pub fn rename_conversation(&mut self, id: &ConversationId, title: &str) {
        let Some(conversation) = self.conversations.get_mut(id) else {
            debug!(conversation = %id, "Rename ignored, conversation not found");
            return;
        };
        conversation.title = title.to_string();
        self.explicit_titles.insert(*id);
        self.publish(StoreEvent::ConversationRenamed(*id));
    }

    /// Remove a conversation and reselect the most recently updated one if needed.
    pub fn delete_conversation(&mut self, id: &ConversationId) {
        let Some(removed) = self.conversations.remove(id) else {
            debug!(conversation = %id, "Delete ignored, conversation not found");
            return;
        };
        self.order.retain(|existing| existing != id);
        self.explicit_titles.remove(id);
        for message in &removed.messages {
            self.message_index.remove(&message.id);
        }

        info!(conversation = %id, "Deleted conversation");
        self.publish(StoreEvent::ConversationDeleted(*id));

        if self.current == Some(*id) {
            let next = self.conversation_list().first().map(|c| c.id);
            self.current = next;
            self.publish(StoreEvent::CurrentChanged(next));
        }
    }

    /// Remove every conversation.
    pub fn clear_all_conversations(&mut self) {
        self.conversations.clear();
        self.order.clear();
        self.message_index.clear();
        self.explicit_titles.clear();
        self.current = None;
        info!("Cleared all conversations");
        self.publish(StoreEvent::Cleared);
        self.publish(StoreEvent::CurrentChanged(None));
    }

    /// Pick the conversation a send targets: the requested one if it exists,
    /// else the current one, else a new conversation.
    pub fn resolve_target(&mut self, requested: Option<ConversationId>) -> ConversationId {
        if let Some(id) = requested.filter(|id| self.conversations.contains_key(id)) {
            return id;
        }
        if let Some(id) = self.current.filter(|id| self.conversations.contains_key(id)) {
            return id;
        }
        self.create_conversation(None)
    }

    // ===== Messages =========================================================

    /// Assign id and timestamp, then append to the owning conversation.
    ///
    /// The built message is returned even when the conversation does not exist;
    /// in that case nothing is stored.
    pub fn append_message(&mut self, new: NewMessage) -> Message {
        let timestamp = self.clock.now();
        let message = Message {
            id: MessageId::new(),
            conversation_id: new.conversation_id,
            role: new.role,
            content: new.content,
            timestamp,
            is_streaming: new.is_streaming && !new.is_complete,
            is_complete: new.is_complete,
            message_type: new.message_type,
        };

        let Some(conversation) = self.conversations.get_mut(&message.conversation_id) else {
            debug!(
                conversation = %message.conversation_id,
                "Append ignored, conversation not found"
            );
            return message;
        };

        let position = conversation.messages.len();
        conversation.messages.push(message.clone());
        conversation.touch(timestamp);

        if position == 0
            && message.role == Role::User
            && !self.explicit_titles.contains(&conversation.id)
        {
            conversation.title = derive_title(&message.content);
        }

        self.message_index
            .insert(message.id, (message.conversation_id, position));
        self.publish(StoreEvent::MessageAppended {
            conversation_id: message.conversation_id,
            message_id: message.id,
        });
        message
    }

    /// Append a complete tool-activity narration message.
    pub fn append_tool_activity(
        &mut self,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> Message {
        self.append_message(NewMessage::tool_activity(conversation_id, content))
    }

    /// Replace a message's content and completion state; unknown ids are ignored.
    pub fn mutate_message_content(&mut self, message_id: &MessageId, content: &str, is_complete: bool) {
        let Some(&(conversation_id, position)) = self.message_index.get(message_id) else {
            debug!(message = %message_id, "Mutation ignored, message not found");
            return;
        };
        let now = self.clock.now();
        let Some(conversation) = self.conversations.get_mut(&conversation_id) else {
            return;
        };
        let Some(message) = conversation.messages.get_mut(position) else {
            return;
        };

        content.clone_into(&mut message.content);
        message.is_complete = is_complete;
        message.is_streaming = !is_complete;
        conversation.touch(now);

        self.publish(StoreEvent::MessageUpdated {
            conversation_id,
            message_id: *message_id,
            is_complete,
        });
    }

    // ===== Views ============================================================

    /// Conversation by id.
    #[must_use]
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// Message by id.
    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        let (conversation_id, position) = self.message_index.get(id)?;
        self.conversations
            .get(conversation_id)?
            .messages
            .get(*position)
    }

    /// Id of the current conversation.
    #[must_use]
    pub const fn current_conversation_id(&self) -> Option<ConversationId> {
        self.current
    }

    /// The current conversation.
    #[must_use]
    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current.and_then(|id| self.conversations.get(&id))
    }

    /// Messages of the current conversation, empty if none is selected.
    #[must_use]
    pub fn current_messages(&self) -> &[Message] {
        self.current_conversation()
            .map_or(&[], |conversation| conversation.messages.as_slice())
    }

    /// Conversations ordered by `updated_at` descending, ties in insertion order.
    #[must_use]
    pub fn conversation_list(&self) -> Vec<&Conversation> {
        let mut list: Vec<&Conversation> = self
            .order
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    /// Number of conversations.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    // ===== Status ===========================================================

    /// Snapshot of the request status.
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        self.status.clone()
    }

    /// A non-streaming request is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.status.loading
    }

    /// A stream handshake is in flight.
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        self.status.connecting
    }

    /// Last user-visible error.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.status.error.as_deref()
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        if self.status.loading != loading {
            self.status.loading = loading;
            self.publish(StoreEvent::StatusChanged);
        }
    }

    pub(crate) fn set_connecting(&mut self, connecting: bool) {
        if self.status.connecting != connecting {
            self.status.connecting = connecting;
            self.publish(StoreEvent::StatusChanged);
        }
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        if self.status.error != error {
            self.status.error = error;
            self.publish(StoreEvent::StatusChanged);
        }
    }

    // ===== Export ===========================================================

    /// Snapshot every conversation for export, in list order.
    #[must_use]
    pub fn export_snapshot(&self) -> ExportData {
        ExportData {
            conversations: self.conversation_list().into_iter().cloned().collect(),
            export_time: self.clock.now(),
            version: EXPORT_SCHEMA_VERSION.to_string(),
        }
    }

    /// Load conversations from an export artifact.
    ///
    /// Conversations with an id already present replace the existing one. The
    /// current selector is left untouched. A title other than the default is
    /// kept as explicit. Messages whose id is already indexed elsewhere get a
    /// fresh id. Returns the number imported.
    pub fn import_conversations(&mut self, data: ExportData) -> usize {
        let count = data.conversations.len();
        for mut conversation in data.conversations {
            let id = conversation.id;
            if let Some(previous) = self.conversations.remove(&id) {
                for message in &previous.messages {
                    self.message_index.remove(&message.id);
                }
            } else {
                self.order.push(id);
            }

            if conversation.title == DEFAULT_TITLE {
                self.explicit_titles.remove(&id);
            } else {
                self.explicit_titles.insert(id);
            }

            for (position, message) in conversation.messages.iter_mut().enumerate() {
                if self.message_index.contains_key(&message.id) {
                    let fresh = MessageId::new();
                    debug!(old = %message.id, new = %fresh, "Imported message id collides, reassigned");
                    message.id = fresh;
                }
                message.conversation_id = id;
                if message.is_complete {
                    message.is_streaming = false;
                }
                self.message_index.insert(message.id, (id, position));
            }
            self.conversations.insert(id, conversation);
        }

        info!(conversations = count, version = %data.version, "Imported conversations");
        self.publish(StoreEvent::Imported {
            conversations: count,
        });
        count
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    /// Clock that only moves when told to.
    pub(crate) struct ManualClock(AtomicI64);

    impl ManualClock {
        pub(crate) fn starting_at(millis: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(millis)))
        }

        pub(crate) fn advance(&self, millis: i64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.0.load(Ordering::SeqCst)).unwrap_or_default()
        }
    }
}
