//! Error types for constrained generation

use thiserror::Error;

use crate::service::llm::ProviderError;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum GenerationError {
    /// Message was empty or whitespace; no provider call was made
    #[error("Message must not be empty")]
    EmptyInput,

    #[error("LLM provider call failed: {0}")]
    Provider(#[from] ProviderError),
}
