//! Error types for batch jobs

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum BatchError {
    #[error("Batch job not found: {0}")]
    NotFound(String),

    /// Every submitted message was rejected by the admission policy
    #[error("No valid messages in batch ({} rejected)", warnings.len())]
    NoValidMessages { warnings: Vec<String> },
}
