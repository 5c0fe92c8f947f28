//! Ticket classification service
//!
//! Message in, validated `SupportTicket` out. Parse and validation failures
//! come back as distinct error kinds and are never retried here.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::model::{BranchResult, SupportTicket, TokenUsage};
use crate::service::decode::{self, DecodeOutcome};
use crate::service::generation::{ConstrainedGenerator, ConstrainedOutput, Strategy};

pub mod error;

pub use error::ClassificationError;

/// A validated ticket plus how it was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedTicket {
    pub ticket: SupportTicket,
    pub strategy: Strategy,
    /// Generation plus decoding time
    pub processing_time_ms: u64,
    pub usage: Option<TokenUsage>,
}

impl BranchResult for ClassifiedTicket {
    fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    fn confidence(&self) -> Option<f64> {
        Some(self.ticket.confidence)
    }
}

pub struct ClassificationService {
    generator: Arc<ConstrainedGenerator>,
}

impl ClassificationService {
    pub fn new(generator: Arc<ConstrainedGenerator>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &ConstrainedGenerator {
        &self.generator
    }

    /// Classify a message with one constrained strategy
    pub async fn classify(
        &self,
        message: &str,
        strategy: Strategy,
    ) -> Result<ClassifiedTicket, ClassificationError> {
        let start = Instant::now();
        let output = self.generator.generate(message, strategy).await?;
        self.decode_output(output, start)
    }

    /// Decode a generated output into a validated ticket.
    ///
    /// `start` marks the beginning of generation so the reported time covers
    /// both steps.
    pub fn decode_output(
        &self,
        output: ConstrainedOutput,
        start: Instant,
    ) -> Result<ClassifiedTicket, ClassificationError> {
        let outcome = decode::decode(&output.raw);

        if let DecodeOutcome::Parsed { elapsed, .. } = &outcome {
            tracing::debug!(
                strategy = output.strategy.as_str(),
                decode_us = elapsed.as_micros() as u64,
                "Decoded model output"
            );
        } else {
            tracing::warn!(
                model = %self.generator.model(),
                strategy = output.strategy.as_str(),
                output_len = output.raw.len(),
                "Constrained output failed to decode"
            );
        }

        let ticket = outcome.into_result()?;

        Ok(ClassifiedTicket {
            ticket,
            strategy: output.strategy,
            processing_time_ms: start.elapsed().as_millis() as u64,
            usage: output.usage,
        })
    }
}
