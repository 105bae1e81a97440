//! `OpenAI` chat completions client.
//!
//! Provides both streaming and non-streaming access. Every request goes
//! through the client's circuit breaker and is attempted once.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::config::OpenAiConfig;
use crate::resilience::{CircuitBreaker, RetryPolicy, call_with_resilience};

use super::error::{ApiErrorResponse, OpenAiError};
use super::types::{ChatMessage, ChatRequest, ChatResponse, CompletionParams, StreamChunk};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Incremental text from a streaming completion.
pub type TextStream = BoxStream<'static, Result<String, OpenAiError>>;

/// `OpenAI` API client.
///
/// Cheap to clone; clones share the connection pool and circuit breaker.
#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    client: reqwest::Client,
    model: String,
    breaker: CircuitBreaker,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.inner.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Create a new `OpenAI` client.
    ///
    /// # Errors
    ///
    /// Returns `OpenAiError::Unauthorized` if the API key is not a valid
    /// header value, or `OpenAiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &OpenAiConfig) -> Result<Self, OpenAiError> {
        let bearer = format!("Bearer {}", config.api_key.expose_secret());
        let mut auth = HeaderValue::from_str(&bearer)
            .map_err(|_| OpenAiError::Unauthorized("API key is not a valid header".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(OpenAiClientInner {
                client,
                model: config.model.clone(),
                breaker: CircuitBreaker::default(),
            }),
        })
    }

    /// The configured chat model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Run a completion and return the assistant's text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the API answers with an error,
    /// or the breaker is open.
    #[instrument(skip(self, messages), fields(model = %self.inner.model))]
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, OpenAiError> {
        let request = self.request(messages, params, None);
        let response = call_with_resilience(RetryPolicy::SINGLE_ATTEMPT, &self.inner.breaker, || {
            self.send(&request)
        })
        .await?;

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| OpenAiError::Parse(format!("Failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| OpenAiError::Parse("response has no content".to_string()))
    }

    /// Run a streaming completion.
    ///
    /// The returned stream yields text deltas as they arrive.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial request fails or is rejected.
    #[instrument(skip(self, messages), fields(model = %self.inner.model))]
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<TextStream, OpenAiError> {
        let request = self.request(messages, params, Some(true));
        let response = call_with_resilience(RetryPolicy::SINGLE_ATTEMPT, &self.inner.breaker, || {
            self.send(&request)
        })
        .await?;

        let events = stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        buffer.extend_from_slice(&chunk);

                        while let Some(event) = extract_sse_event(&mut buffer) {
                            match event {
                                Ok(event) => {
                                    if let Some(parsed) = parse_sse_event(&event) {
                                        yield parsed;
                                    }
                                }
                                Err(e) => yield Err(e),
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(OpenAiError::Stream(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(events.boxed())
    }

    fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: CompletionParams,
        stream: Option<bool>,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.inner.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
        }
    }

    /// POST the request, mapping non-2xx responses to errors.
    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, OpenAiError> {
        let response = self
            .inner
            .client
            .post(OPENAI_API_URL)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(handle_error_status(status, response).await)
        }
    }
}

/// Translate an error response.
async fn handle_error_status(status: reqwest::StatusCode, response: reqwest::Response) -> OpenAiError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);
        return OpenAiError::RateLimited(retry_after);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return OpenAiError::Unauthorized("Invalid API key".to_string());
    }

    match response.text().await {
        Ok(body) => match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_error) => OpenAiError::Api {
                status: status.as_u16(),
                error_type: api_error
                    .error
                    .error_type
                    .unwrap_or_else(|| "unknown".to_string()),
                message: api_error.error.message,
            },
            Err(_) => OpenAiError::Api {
                status: status.as_u16(),
                error_type: "unknown".to_string(),
                message: body,
            },
        },
        Err(e) => OpenAiError::Http(e),
    }
}

/// Take one complete SSE event off the front of the buffer.
///
/// Works on bytes so a multi-byte character split across network chunks is
/// only decoded once the whole event has arrived.
fn extract_sse_event(buffer: &mut Vec<u8>) -> Option<Result<String, OpenAiError>> {
    let idx = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event: Vec<u8> = buffer.drain(..idx + 2).take(idx).collect();
    Some(String::from_utf8(event).map_err(|e| OpenAiError::Parse(format!("Invalid UTF-8: {e}"))))
}

/// Parse one SSE event into the text delta it carries.
///
/// Returns `None` for keep-alives, the `[DONE]` marker and chunks without
/// content (such as the leading role-only chunk).
fn parse_sse_event(event: &str) -> Option<Result<String, OpenAiError>> {
    let data = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .last()?;

    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk.into_content().filter(|c| !c.is_empty()).map(Ok),
        Err(e) => Some(Err(OpenAiError::Parse(format!(
            "Failed to parse stream chunk: {e}"
        )))),
    }
}
