//! Unstructured fallback extraction
//!
//! Recovers ticket fields from free-text completions. Extraction never fails:
//! it always returns a best-effort [`ExtractionResult`] with its defects and a
//! confidence kept inside [`CONFIDENCE_FLOOR`, `CONFIDENCE_CEILING`].

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use serde::Serialize;

use crate::model::{BranchResult, ExtractionMethod, ExtractionResult, SupportTicket, TokenUsage};
use crate::service::decode;
use crate::service::generation::{ConstrainedGenerator, GenerationError, Strategy};

pub mod categories;
pub mod delimiter;
pub mod keyword;

pub use delimiter::DelimiterExtractor;
pub use keyword::KeywordExtractor;

pub const CONFIDENCE_FLOOR: f64 = 0.1;
pub const CONFIDENCE_CEILING: f64 = 0.95;

/// Responses shorter than this are flagged
pub const BRIEF_RESPONSE_CHARS: usize = 50;
pub const BRIEF_RESPONSE_DEFECT: &str = "response is very brief (under 50 characters)";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").unwrap());

pub fn clamp_confidence(confidence: f64) -> f64 {
    confidence.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

/// Non-empty, trimmed blank-line separated paragraphs
pub fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Longest paragraph; the first one wins ties
pub fn longest_paragraph(text: &str) -> Option<&str> {
    paragraphs(text)
        .into_iter()
        .fold(None, |best: Option<&str>, p| match best {
            Some(b) if b.chars().count() >= p.chars().count() => Some(b),
            _ => Some(p),
        })
}

/// Both extraction strategies behind one entry point
#[derive(Default)]
pub struct FallbackExtractor {
    keyword: KeywordExtractor,
    delimiter: DelimiterExtractor,
}

impl FallbackExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(&self, text: &str, method: ExtractionMethod) -> ExtractionResult {
        match method {
            ExtractionMethod::KeywordRules => self.keyword.extract(text),
            ExtractionMethod::DelimiterScan => self.delimiter.extract(text),
        }
    }
}

/// Free-text completion and what could be recovered from it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnstructuredAnalysis {
    pub raw_output: String,
    pub extraction: ExtractionResult,
    /// Valid ticket JSON the free text happened to contain
    pub embedded_ticket: Option<SupportTicket>,
    pub processing_time_ms: u64,
    pub usage: Option<TokenUsage>,
}

impl BranchResult for UnstructuredAnalysis {
    fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    fn confidence(&self) -> Option<f64> {
        Some(self.extraction.confidence)
    }
}

/// Unconstrained generation followed by heuristic extraction
pub struct UnstructuredService {
    generator: Arc<ConstrainedGenerator>,
    extractor: FallbackExtractor,
}

impl UnstructuredService {
    pub fn new(generator: Arc<ConstrainedGenerator>) -> Self {
        Self {
            generator,
            extractor: FallbackExtractor::new(),
        }
    }

    pub async fn analyze(
        &self,
        message: &str,
        method: ExtractionMethod,
    ) -> Result<UnstructuredAnalysis, GenerationError> {
        let start = Instant::now();
        let output = self.generator.generate(message, Strategy::Unconstrained).await?;
        let extraction = self.extractor.extract(&output.raw, method);
        let embedded_ticket = decode::decode_candidate(&output.raw).into_result().ok();

        tracing::info!(
            method = method.as_str(),
            confidence = extraction.confidence,
            defects = extraction.errors.len(),
            embedded_ticket = embedded_ticket.is_some(),
            "Extracted fields from free-text output"
        );

        Ok(UnstructuredAnalysis {
            raw_output: output.raw,
            extraction,
            embedded_ticket,
            processing_time_ms: start.elapsed().as_millis() as u64,
            usage: output.usage,
        })
    }
}
