//! Shared LLM client and provider seam
//!
//! [`ChatProvider`] is the boundary every generation path talks to.
//! [`OpenAiClient`] implements it against an OpenAI-compatible
//! `/chat/completions` endpoint, in one-shot or SSE streaming mode.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::model::{LlmConfig, TokenUsage};

/// Transport or provider-level failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Provider rejected credentials: {0}")]
    Auth(String),

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider returned an empty response: {0}")]
    EmptyResponse(String),

    #[error("Malformed provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Only transient transport faults are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_) | ProviderError::RateLimited(_) | ProviderError::Server { .. }
        )
    }

    /// Map a non-success HTTP status to an error kind
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth(body),
            429 => ProviderError::RateLimited(body),
            500..=599 => ProviderError::Server {
                status,
                message: body,
            },
            _ => ProviderError::Rejected {
                status,
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Output constraint attached to a completion request
#[derive(Debug, Clone, PartialEq)]
pub enum OutputConstraint {
    /// Bind the schema as the response format
    ResponseFormat { name: String, schema: Value },
    /// Expose the schema as a single tool and force the model to call it
    Tool {
        name: String,
        description: String,
        schema: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub constraint: Option<OutputConstraint>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One-shot completion result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: Option<String>,
    /// Argument string of the first tool call, if any
    pub tool_arguments: Option<String>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// Incremental piece of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    Content(String),
    ToolArguments(String),
    Usage(TokenUsage),
}

pub type DeltaStream = BoxStream<'static, Result<StreamDelta, ProviderError>>;

/// Chat-completion provider
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ProviderError>;

    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream, ProviderError>;
}

/// OpenAI-compatible chat client
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Create a new client with the provided API key
    pub fn new(api_key: &str, config: &LlmConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(base_url = %config.base_url, "LLM client initialized");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "Provider returned error status");
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ProviderError> {
        let body = build_request_body(request, false);
        let envelope: CompletionEnvelope = self.post(&body).await?.json().await?;
        envelope.into_completion()
    }

    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream, ProviderError> {
        let body = build_request_body(request, true);
        let response = self.post(&body).await?;

        let mut decoder = SseDecoder::default();
        let deltas = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder
                    .push(&bytes)
                    .iter()
                    .flat_map(|payload| parse_stream_payload(payload))
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(ProviderError::from(e))],
            })
            .flat_map(stream::iter);

        Ok(deltas.boxed())
    }
}

/// Build the `/chat/completions` JSON body
pub fn build_request_body(request: &ChatRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });

    match &request.constraint {
        Some(OutputConstraint::ResponseFormat { name, schema }) => {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": name,
                    "strict": true,
                    "schema": schema,
                }
            });
        }
        Some(OutputConstraint::Tool {
            name,
            description,
            schema,
        }) => {
            body["tools"] = json!([{
                "type": "function",
                "function": {
                    "name": name,
                    "description": description,
                    "strict": true,
                    "parameters": schema,
                }
            }]);
            body["tool_choice"] = json!({
                "type": "function",
                "function": { "name": name }
            });
        }
        None => {}
    }

    if stream {
        body["stream"] = json!(true);
        body["stream_options"] = json!({ "include_usage": true });
    }

    body
}

// ============================================================================
// Wire envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
struct UsageEnvelope {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<UsageEnvelope> for TokenUsage {
    fn from(u: UsageEnvelope) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    choices: Vec<ChoiceEnvelope>,
    usage: Option<UsageEnvelope>,
}

#[derive(Debug, Deserialize)]
struct ChoiceEnvelope {
    message: Option<MessageEnvelope>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallEnvelope>,
}

#[derive(Debug, Deserialize)]
struct ToolCallEnvelope {
    function: FunctionEnvelope,
}

#[derive(Debug, Deserialize)]
struct FunctionEnvelope {
    #[serde(default)]
    arguments: String,
}

impl CompletionEnvelope {
    fn into_completion(self) -> Result<ChatCompletion, ProviderError> {
        let usage = self.usage.map(TokenUsage::from);
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse("no choices returned".to_string()))?;

        let message = choice
            .message
            .ok_or_else(|| ProviderError::EmptyResponse("choice carries no message".to_string()))?;

        Ok(ChatCompletion {
            content: message.content,
            tool_arguments: message.tool_calls.into_iter().next().map(|c| c.function.arguments),
            usage,
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<UsageEnvelope>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    arguments: Option<String>,
}

/// Turn one SSE `data:` payload into deltas. `[DONE]` yields nothing.
fn parse_stream_payload(payload: &str) -> Vec<Result<StreamDelta, ProviderError>> {
    if payload == "[DONE]" {
        return Vec::new();
    }

    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return vec![Err(ProviderError::Decode(format!("stream chunk: {}", e)))],
    };

    let mut deltas = Vec::new();
    for delta in chunk.choices.into_iter().filter_map(|c| c.delta) {
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            deltas.push(Ok(StreamDelta::Content(content)));
        }
        for arguments in delta
            .tool_calls
            .into_iter()
            .filter_map(|t| t.function.and_then(|f| f.arguments))
            .filter(|a| !a.is_empty())
        {
            deltas.push(Ok(StreamDelta::ToolArguments(arguments)));
        }
    }
    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage(usage.into())));
    }

    deltas
}

/// Splits a server-sent-event byte stream into `data:` payloads.
///
/// Network chunks can cut lines (and UTF-8 sequences) anywhere, so bytes are
/// buffered until a newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }

        payloads
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn request(constraint: Option<OutputConstraint>) -> ChatRequest {
        ChatRequest {
            model: "gpt-test".to_string(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hello")],
            constraint,
            temperature: 0.3,
            max_tokens: 500,
        }
    }

    #[test]
    fn test_response_format_body() {
        let body = build_request_body(
            &request(Some(OutputConstraint::ResponseFormat {
                name: "support_ticket".to_string(),
                schema: json!({"type": "object"}),
            })),
            false,
        );

        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "support_ticket");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!(body.get("tools").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_tool_body_forces_tool_choice() {
        let body = build_request_body(
            &request(Some(OutputConstraint::Tool {
                name: "classify_message".to_string(),
                description: "Classify".to_string(),
                schema: json!({"type": "object"}),
            })),
            true,
        );

        assert_eq!(body["tools"][0]["function"]["name"], "classify_message");
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
        assert_eq!(body["tool_choice"]["function"]["name"], "classify_message");
        assert!(body.get("response_format").is_none());
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_unconstrained_body() {
        let body = build_request_body(&request(None), false);
        assert!(body.get("response_format").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(ProviderError::from_status(401, String::new()), ProviderError::Auth(_)));
        assert!(ProviderError::from_status(429, String::new()).is_retryable());
        assert!(ProviderError::from_status(503, String::new()).is_retryable());
        let rejected = ProviderError::from_status(400, String::new());
        assert!(matches!(rejected, ProviderError::Rejected { status: 400, .. }));
        assert!(!rejected.is_retryable());
        assert!(!ProviderError::EmptyResponse(String::new()).is_retryable());
        assert!(!ProviderError::Auth(String::new()).is_retryable());
    }

    #[test]
    fn test_envelope_with_tool_call() {
        let envelope: CompletionEnvelope = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{ "function": { "name": "classify_message", "arguments": "{\"a\":1}" } }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12 }
        }))
        .unwrap();

        let completion = envelope.into_completion().unwrap();
        assert_eq!(completion.tool_arguments.as_deref(), Some("{\"a\":1}"));
        assert_eq!(completion.content, None);
        assert_eq!(completion.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_envelope_without_choices_is_empty_response() {
        let envelope: CompletionEnvelope = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(
            envelope.into_completion(),
            Err(ProviderError::EmptyResponse(_))
        ));
    }

    #[test]
    fn test_sse_decoder_buffers_partial_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());

        let payloads = decoder.push(b"tent\":\"Hi\"}}]}\n\ndata: [DONE]\n");
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1], "[DONE]");

        let deltas = parse_stream_payload(&payloads[0]);
        assert_eq!(deltas, vec![Ok(StreamDelta::Content("Hi".to_string()))]);
        assert!(parse_stream_payload(&payloads[1]).is_empty());
    }

    #[test]
    fn test_stream_payload_tool_arguments_and_usage() {
        let deltas = parse_stream_payload(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"sent"}}]}}],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
        );
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0], Ok(StreamDelta::ToolArguments("{\"sent".to_string())));
        assert!(matches!(deltas[1], Ok(StreamDelta::Usage(TokenUsage { total_tokens: 3, .. }))));
    }

    #[test]
    fn test_stream_payload_garbage_is_decode_error() {
        let deltas = parse_stream_payload("{not json");
        assert!(matches!(deltas[0], Err(ProviderError::Decode(_))));
    }
}
