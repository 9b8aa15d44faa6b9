//! HTTP client for the agent backend.
//!
//! Issues the plain chat call, pushes typewriter settings and opens the SSE
//! chat stream. Reconnection is not attempted here: a transport error ends the
//! frame sequence's useful life and the controller decides what it means.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{ChatRequest, ChatResponse, TypewriterConfig};
use crate::settings::config::EndpointConfig;
use crate::stream::frame::{Frame, FrameStream};

/// Non-streaming backend operations.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a message and wait for the whole reply.
    ///
    /// # Errors
    /// Returns an error if the request fails or the backend answers with an error status.
    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse>;

    /// Push typewriter settings.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    async fn configure_typewriter(&self, config: &TypewriterConfig) -> ApiResult<()>;

    /// Backend health text.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be reached.
    async fn health(&self) -> ApiResult<String>;
}

/// Opens chat event streams.
pub trait StreamTransport: Send + Sync {
    /// Open a stream for `request`.
    ///
    /// # Errors
    /// Returns an error if the request cannot be built.
    fn open(&self, request: &ChatRequest) -> ApiResult<FrameStream>;
}

/// `reqwest` implementation of both backend seams.
pub struct AgentApi {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: Url,
}

impl AgentApi {
    /// Build a client for the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or a client cannot be built.
    pub fn new(config: &EndpointConfig) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .gzip(true)
            .build()
            .map_err(|e| ApiError::HttpClient(e.to_string()))?;

        // No total timeout: a stream stays open for as long as the reply takes.
        let stream_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            stream_client,
            base_url,
        })
    }

    /// Base URL all endpoints hang off.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// URL of the stream endpoint for `request`.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be built.
    pub fn stream_url(&self, request: &ChatRequest) -> ApiResult<Url> {
        let mut url = self.endpoint("chat-stream")?;
        url.query_pairs_mut().extend_pairs(request.form_fields());
        Ok(url)
    }
}

async fn ensure_success(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Backend returned an error status");
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChatBackend for AgentApi {
    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse> {
        let url = self.endpoint("chat")?;
        debug!(%url, "POST chat");

        let response = self
            .client
            .post(url)
            .form(&request.form_fields())
            .send()
            .await?;
        let result = ensure_success(response).await?.text().await?;

        Ok(ChatResponse {
            result,
            conversation_id: request.conversation_id,
        })
    }

    async fn configure_typewriter(&self, config: &TypewriterConfig) -> ApiResult<()> {
        let url = self.endpoint("config/typewriter")?;
        debug!(%url, enabled = config.enabled, delay = config.delay, "POST typewriter config");

        let response = self
            .client
            .post(url)
            .form(&config.form_fields())
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn health(&self) -> ApiResult<String> {
        let url = self.endpoint("health")?;
        let response = self.client.get(url).send().await?;
        Ok(ensure_success(response).await?.text().await?)
    }
}

impl StreamTransport for AgentApi {
    fn open(&self, request: &ChatRequest) -> ApiResult<FrameStream> {
        let url = self.stream_url(request)?;
        info!(%url, "Opening chat stream");

        let builder = self
            .stream_client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let source = EventSource::new(builder).map_err(|e| ApiError::StreamSetup(e.to_string()))?;
        Ok(frames_from(source))
    }
}

/// Translate `EventSource` events into frames.
fn frames_from(source: EventSource) -> FrameStream {
    Box::pin(source.filter_map(|event| async move {
        match event {
            Ok(Event::Open) => Some(Frame::Open),
            Ok(Event::Message(message)) => Frame::classify(&message.event, message.data),
            Err(err) => {
                warn!(error = %err, "Chat stream transport error");
                Some(Frame::TransportError)
            }
        }
    }))
}
