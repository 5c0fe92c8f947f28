//! Best-effort extraction results recovered from free-text completions

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ticket::{Department, Priority, Sentiment};

/// Heuristic path that produced an [`ExtractionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Whole-text keyword rules with a `reply:` label lookup
    #[default]
    #[serde(alias = "keyword")]
    KeywordRules,
    /// Fences, tags, labeled lines and marker pairs
    #[serde(alias = "delimiter")]
    DelimiterScan,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::KeywordRules => "keyword_rules",
            ExtractionMethod::DelimiterScan => "delimiter_scan",
        }
    }
}

/// Degraded analogue of `SupportTicket`.
///
/// Each field is optional; `None` means the extractor could not determine it.
/// `confidence` reflects extraction reliability, not classification certainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractionResult {
    pub sentiment: Option<Sentiment>,
    pub department: Option<Department>,
    pub priority: Option<Priority>,
    pub reply: Option<String>,
    pub confidence: f64,
    /// Extraction defects, in the order they were detected
    pub errors: Vec<String>,
    pub method: ExtractionMethod,
}
