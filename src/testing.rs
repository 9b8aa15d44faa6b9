//! Test doubles for the backend seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;

use crate::api::client::{ChatBackend, StreamTransport};
use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{ChatRequest, ChatResponse, TypewriterConfig};
use crate::chat::store::{ChatStore, SharedStore};
use crate::stream::frame::{Frame, FrameStream};

/// Transport handing out pre-registered frame channels in order.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    pending: Mutex<VecDeque<mpsc::UnboundedReceiver<Frame>>>,
    opened: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    /// Register the next stream and return its sending half.
    pub(crate) fn push(&self) -> mpsc::UnboundedSender<Frame> {
        let (tx, rx) = mpsc::unbounded();
        self.pending.lock().unwrap().push_back(rx);
        tx
    }

    pub(crate) fn opened(&self) -> Vec<ChatRequest> {
        self.opened.lock().unwrap().clone()
    }
}

impl StreamTransport for ScriptedTransport {
    fn open(&self, request: &ChatRequest) -> ApiResult<FrameStream> {
        self.opened.lock().unwrap().push(request.clone());
        let rx = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::StreamSetup("no scripted stream".to_string()))?;
        Ok(Box::pin(rx))
    }
}

/// Backend answering from canned values.
pub(crate) struct MockBackend {
    reply: Result<String, u16>,
    typewriter_status: Option<u16>,
    pushed: Mutex<Vec<TypewriterConfig>>,
}

impl MockBackend {
    pub(crate) fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            typewriter_status: None,
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(status: u16) -> Self {
        Self {
            reply: Err(status),
            typewriter_status: Some(status),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn pushed(&self) -> Vec<TypewriterConfig> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse> {
        match &self.reply {
            Ok(text) => Ok(ChatResponse {
                result: text.clone(),
                conversation_id: request.conversation_id,
            }),
            Err(status) => Err(ApiError::Status {
                status: *status,
                body: String::new(),
            }),
        }
    }

    async fn configure_typewriter(&self, config: &TypewriterConfig) -> ApiResult<()> {
        if let Some(status) = self.typewriter_status {
            return Err(ApiError::Status {
                status,
                body: String::new(),
            });
        }
        self.pushed.lock().unwrap().push(*config);
        Ok(())
    }

    async fn health(&self) -> ApiResult<String> {
        Ok("running".to_string())
    }
}

/// Poll the store until `predicate` holds.
pub(crate) async fn wait_until<F>(store: &SharedStore, mut predicate: F)
where
    F: FnMut(&ChatStore) -> bool,
{
    for _ in 0..400 {
        if predicate(&*store.lock().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("store never reached the expected state");
}
