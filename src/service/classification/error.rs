//! Error types for ticket classification

use thiserror::Error;

use crate::service::decode::{DecodeFailure, ParseFailure};
use crate::service::generation::GenerationError;
use crate::service::schema::ValidationFailure;

/// Why a message could not be turned into a `SupportTicket`
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ClassificationError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Model output was not valid JSON: {0}")]
    Parse(ParseFailure),

    #[error("Model output did not match the ticket schema: {0}")]
    Validation(ValidationFailure),
}

impl ClassificationError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ClassificationError::Generation(GenerationError::EmptyInput) => "empty_input",
            ClassificationError::Generation(_) => "provider_error",
            ClassificationError::Parse(_) => "parse_error",
            ClassificationError::Validation(_) => "validation_error",
        }
    }
}

impl From<DecodeFailure> for ClassificationError {
    fn from(failure: DecodeFailure) -> Self {
        match failure {
            DecodeFailure::Parse(f) => ClassificationError::Parse(f),
            DecodeFailure::Validation(f) => ClassificationError::Validation(f),
        }
    }
}
