//! Constrained generation adapter
//!
//! Issues chat completions under a response-format binding, a forced
//! tool-call binding, or no constraint at all, and returns the raw text the
//! model produced. Decoding is left to the caller.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{LlmConfig, TokenUsage};
use crate::service::llm::{
    ChatCompletion, ChatMessage, ChatProvider, ChatRequest, OutputConstraint, ProviderError,
    StreamDelta,
};
use crate::service::schema::{SCHEMA_NAME, TicketSchema};

pub mod error;
pub mod prompts;
pub mod retry;
pub mod stream;

pub use error::GenerationError;
pub use retry::RetryPolicy;
pub use stream::{AccumulatorError, AccumulatorState, StreamAccumulator};

use prompts::{
    CLASSIFICATION_SYSTEM_PROMPT, FREE_TEXT_SYSTEM_PROMPT, TOOL_DESCRIPTION, TOOL_SYSTEM_PROMPT,
    build_classification_prompt, build_free_text_prompt,
};

/// Name of the function the model is forced to call
pub const TOOL_NAME: &str = "classify_message";

/// How the completion is constrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ResponseFormat,
    ToolCall,
    /// No constraint; free text
    Unconstrained,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ResponseFormat => "response_format",
            Strategy::ToolCall => "tool_call",
            Strategy::Unconstrained => "unconstrained",
        }
    }
}

/// Raw model output plus request metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedOutput {
    /// Message content, or the tool-call argument string
    pub raw: String,
    pub strategy: Strategy,
    pub processing_time_ms: u64,
    pub usage: Option<TokenUsage>,
}

/// Wraps a [`ChatProvider`] with the ticket schema constraint and retry
pub struct ConstrainedGenerator {
    provider: Arc<dyn ChatProvider>,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl ConstrainedGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>, config: LlmConfig) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        tracing::info!(
            model = %config.model,
            max_attempts = retry.max_attempts,
            "Constrained generator initialized"
        );
        Self {
            provider,
            config,
            retry,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Build the provider request for `message` under `strategy`
    pub fn build_request(&self, message: &str, strategy: Strategy) -> ChatRequest {
        let schema = TicketSchema::shared().to_json_schema().provider_schema();

        let (system, user, constraint, temperature) = match strategy {
            Strategy::ResponseFormat => (
                CLASSIFICATION_SYSTEM_PROMPT,
                build_classification_prompt(message),
                Some(OutputConstraint::ResponseFormat {
                    name: SCHEMA_NAME.to_string(),
                    schema,
                }),
                self.config.temperature,
            ),
            Strategy::ToolCall => (
                TOOL_SYSTEM_PROMPT,
                build_classification_prompt(message),
                Some(OutputConstraint::Tool {
                    name: TOOL_NAME.to_string(),
                    description: TOOL_DESCRIPTION.to_string(),
                    schema,
                }),
                self.config.temperature,
            ),
            Strategy::Unconstrained => (
                FREE_TEXT_SYSTEM_PROMPT,
                build_free_text_prompt(message),
                None,
                self.config.unstructured_temperature,
            ),
        };

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            constraint,
            temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// One-shot generation
    pub async fn generate(
        &self,
        message: &str,
        strategy: Strategy,
    ) -> Result<ConstrainedOutput, GenerationError> {
        ensure_message(message)?;

        let start = Instant::now();
        let request = self.build_request(message, strategy);

        tracing::debug!(
            model = %self.config.model,
            strategy = strategy.as_str(),
            message_len = message.len(),
            "Requesting completion"
        );

        let completion = self
            .retry
            .run(strategy.as_str(), || self.provider.complete(&request))
            .await?;

        let usage = completion.usage;
        let raw = raw_output(completion, strategy)?;
        let elapsed = start.elapsed();

        tracing::info!(
            model = %self.config.model,
            strategy = strategy.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            output_len = raw.len(),
            "Completion received"
        );

        Ok(ConstrainedOutput {
            raw,
            strategy,
            processing_time_ms: elapsed.as_millis() as u64,
            usage,
        })
    }

    /// Streamed generation.
    ///
    /// Only opening the stream is retried; a stream that breaks midway fails
    /// with the partial length recorded. `on_progress` receives the
    /// accumulated length after every fragment.
    pub async fn generate_streaming<F>(
        &self,
        message: &str,
        strategy: Strategy,
        mut on_progress: F,
    ) -> Result<ConstrainedOutput, GenerationError>
    where
        F: FnMut(usize) + Send,
    {
        ensure_message(message)?;

        let start = Instant::now();
        let request = self.build_request(message, strategy);

        let mut deltas = self
            .retry
            .run(strategy.as_str(), || self.provider.stream(&request))
            .await?;

        let mut accumulator = StreamAccumulator::new();
        while let Some(delta) = deltas.next().await {
            let fragment = match delta {
                Ok(StreamDelta::Content(text)) if strategy != Strategy::ToolCall => text,
                Ok(StreamDelta::ToolArguments(args)) if strategy == Strategy::ToolCall => args,
                Ok(StreamDelta::Usage(usage)) => {
                    accumulator.record_usage(usage);
                    continue;
                }
                Ok(_) => continue,
                Err(e) => {
                    let failure = accumulator.fail(e.clone());
                    tracing::warn!(
                        strategy = strategy.as_str(),
                        state = ?accumulator.state(),
                        received = accumulator.partial().len(),
                        error = %failure,
                        "Completion stream failed"
                    );
                    return Err(GenerationError::Provider(e));
                }
            };

            match accumulator.push(&fragment) {
                Ok(len) => on_progress(len),
                Err(e) => {
                    return Err(GenerationError::Provider(ProviderError::Decode(e.to_string())));
                }
            }
        }

        let raw = accumulator.finish().map_err(|_| {
            ProviderError::EmptyResponse(format!("{} stream produced no output", strategy.as_str()))
        })?;
        let elapsed = start.elapsed();

        tracing::info!(
            model = %self.config.model,
            strategy = strategy.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            output_len = raw.len(),
            "Streamed completion assembled"
        );

        Ok(ConstrainedOutput {
            raw,
            strategy,
            processing_time_ms: elapsed.as_millis() as u64,
            usage: accumulator.usage(),
        })
    }
}

fn ensure_message(message: &str) -> Result<(), GenerationError> {
    if message.trim().is_empty() {
        return Err(GenerationError::EmptyInput);
    }
    Ok(())
}

/// Pick the raw output slot the strategy expects.
///
/// Missing or blank output is an empty provider response, never a parse
/// failure.
fn raw_output(completion: ChatCompletion, strategy: Strategy) -> Result<String, ProviderError> {
    let raw = match strategy {
        Strategy::ToolCall => completion.tool_arguments,
        Strategy::ResponseFormat | Strategy::Unconstrained => completion.content,
    };

    match raw {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ProviderError::EmptyResponse(format!(
            "{} completion carried no output (finish_reason: {})",
            strategy.as_str(),
            completion.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}
