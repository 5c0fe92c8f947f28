//! Comparison records produced by running two generation paths side by side

use serde::Serialize;

/// Generation path taking part in a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    ResponseFormat,
    ToolCall,
    Unstructured,
}

/// Anything a comparison branch can yield on success
pub trait BranchResult {
    /// Time the branch spent producing the value
    fn processing_time_ms(&self) -> u64;

    /// Confidence score, if the value carries one
    fn confidence(&self) -> Option<f64>;
}

/// Result of one branch: its value, or an explicit failure marker
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome<T> {
    Succeeded { data: T },
    Failed { kind: String, error: String },
}

impl<T> BranchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, BranchOutcome::Succeeded { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            BranchOutcome::Succeeded { data } => Some(data),
            BranchOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchReport<T> {
    pub branch: Branch,
    pub processing_time_ms: u64,
    pub outcome: BranchOutcome<T>,
}

/// Ephemeral record of a two-branch comparison run.
///
/// `faster` and `time_difference_ms` are only set when both branches
/// succeeded; a partial result keeps the failure marker of the other branch.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRecord<L, R> {
    pub left: BranchReport<L>,
    pub right: BranchReport<R>,
    pub faster: Option<Branch>,
    pub time_difference_ms: Option<u64>,
    pub confidence_delta: Option<f64>,
}

impl<L, R> ComparisonRecord<L, R> {
    pub fn is_partial(&self) -> bool {
        !(self.left.outcome.is_success() && self.right.outcome.is_success())
    }
}

/// Status token carried by a progress frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Analyzing,
    Structuring,
    Validating,
    Complete,
    Error,
    /// Terminating frame holding both branch results
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Structured,
    Unstructured,
    Final,
}

/// One server-sent progress event of a streamed comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub status: Stage,
    /// 0-100
    pub progress: u8,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unstructured: Option<serde_json::Value>,
}

impl ProgressFrame {
    pub fn new(frame_type: FrameType, status: Stage, progress: u8, details: impl Into<String>) -> Self {
        Self {
            frame_type,
            status,
            progress: progress.min(100),
            details: details.into(),
            data: None,
            structured: None,
            unstructured: None,
        }
    }

    /// Terminating frame with the structured and unstructured branch results
    pub fn finished(
        details: impl Into<String>,
        structured: serde_json::Value,
        unstructured: serde_json::Value,
    ) -> Self {
        Self {
            structured: Some(structured),
            unstructured: Some(unstructured),
            ..Self::new(FrameType::Final, Stage::Final, 100, details)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
