//! Comparison orchestrator
//!
//! Runs two generation paths over the same message concurrently and reports
//! timing and confidence differences. Both branches always run to completion;
//! one failure yields a partial record, two failures a combined error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::channel::mpsc::UnboundedSender;
use serde::Serialize;
use serde_json::json;

use crate::model::{
    Branch, BranchOutcome, BranchReport, BranchResult, ComparisonRecord, ExtractionMethod,
    FrameType, ProgressFrame, Stage,
};
use crate::service::classification::{ClassificationError, ClassificationService, ClassifiedTicket};
use crate::service::extraction::{UnstructuredAnalysis, UnstructuredService};
use crate::service::generation::{GenerationError, Strategy};

pub type StructuredVsUnstructured = ComparisonRecord<ClassifiedTicket, UnstructuredAnalysis>;
pub type StrategyComparison = ComparisonRecord<ClassifiedTicket, ClassifiedTicket>;

/// Error categories a branch failure can be reported under
pub trait FailureKind {
    fn kind(&self) -> &'static str;
}

impl FailureKind for ClassificationError {
    fn kind(&self) -> &'static str {
        ClassificationError::kind(self)
    }
}

impl FailureKind for GenerationError {
    fn kind(&self) -> &'static str {
        match self {
            GenerationError::EmptyInput => "empty_input",
            GenerationError::Provider(_) => "provider_error",
        }
    }
}

/// Why one branch failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchFailure {
    pub branch: Branch,
    pub kind: String,
    pub message: String,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.branch, self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ComparisonError {
    #[error("Message must not be empty")]
    EmptyInput,

    #[error("Both branches failed ({left}; {right})")]
    BothFailed {
        left: BranchFailure,
        right: BranchFailure,
    },
}

/// A branch's settled result and its wall-clock time
pub struct Settled<T, E> {
    pub branch: Branch,
    pub result: Result<T, E>,
    pub elapsed_ms: u64,
}

async fn settle<T, E>(branch: Branch, fut: impl Future<Output = Result<T, E>>) -> Settled<T, E> {
    let start = Instant::now();
    let result = fut.await;
    Settled {
        branch,
        result,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

fn report<T, E>(settled: Settled<T, E>) -> BranchReport<T>
where
    T: BranchResult,
    E: FailureKind + fmt::Display,
{
    match settled.result {
        Ok(data) => BranchReport {
            branch: settled.branch,
            processing_time_ms: data.processing_time_ms(),
            outcome: BranchOutcome::Succeeded { data },
        },
        Err(e) => BranchReport {
            branch: settled.branch,
            processing_time_ms: settled.elapsed_ms,
            outcome: BranchOutcome::Failed {
                kind: e.kind().to_string(),
                error: e.to_string(),
            },
        },
    }
}

fn failure<E: FailureKind + fmt::Display>(branch: Branch, e: &E) -> BranchFailure {
    BranchFailure {
        branch,
        kind: e.kind().to_string(),
        message: e.to_string(),
    }
}

/// Build a comparison record from two settled branches.
///
/// `faster` and `time_difference_ms` need both branches to have succeeded;
/// ties go to the left branch.
pub fn compare_branches<L, R, EL, ER>(
    left: Settled<L, EL>,
    right: Settled<R, ER>,
) -> Result<ComparisonRecord<L, R>, ComparisonError>
where
    L: BranchResult,
    R: BranchResult,
    EL: FailureKind + fmt::Display,
    ER: FailureKind + fmt::Display,
{
    if let (Err(l), Err(r)) = (&left.result, &right.result) {
        return Err(ComparisonError::BothFailed {
            left: failure(left.branch, l),
            right: failure(right.branch, r),
        });
    }

    let left = report(left);
    let right = report(right);

    let (faster, time_difference_ms, confidence_delta) =
        match (left.outcome.data(), right.outcome.data()) {
            (Some(l), Some(r)) => {
                let (lt, rt) = (l.processing_time_ms(), r.processing_time_ms());
                let faster = if lt <= rt { left.branch } else { right.branch };
                let delta = match (l.confidence(), r.confidence()) {
                    (Some(a), Some(b)) => Some((a - b).abs()),
                    _ => None,
                };
                (Some(faster), Some(lt.abs_diff(rt)), delta)
            }
            _ => (None, None, None),
        };

    Ok(ComparisonRecord {
        left,
        right,
        faster,
        time_difference_ms,
        confidence_delta,
    })
}

fn emit(sink: &UnboundedSender<ProgressFrame>, frame: ProgressFrame) {
    // A closed receiver means the client went away; the comparison still runs
    // to completion.
    let _ = sink.unbounded_send(frame);
}

pub struct ComparisonService {
    classification: Arc<ClassificationService>,
    unstructured: Arc<UnstructuredService>,
}

impl ComparisonService {
    pub fn new(
        classification: Arc<ClassificationService>,
        unstructured: Arc<UnstructuredService>,
    ) -> Self {
        Self {
            classification,
            unstructured,
        }
    }

    /// Response-format classification against free text plus extraction
    pub async fn compare_structured_vs_unstructured(
        &self,
        message: &str,
        method: ExtractionMethod,
    ) -> Result<StructuredVsUnstructured, ComparisonError> {
        ensure_message(message)?;

        let (structured, unstructured) = tokio::join!(
            settle(
                Branch::ResponseFormat,
                self.classification.classify(message, Strategy::ResponseFormat)
            ),
            settle(Branch::Unstructured, self.unstructured.analyze(message, method)),
        );

        let record = compare_branches(structured, unstructured)?;
        log_record(&record);
        Ok(record)
    }

    /// Response-format binding against forced tool-call binding
    pub async fn compare_strategies(
        &self,
        message: &str,
    ) -> Result<StrategyComparison, ComparisonError> {
        ensure_message(message)?;

        let (response_format, tool_call) = tokio::join!(
            settle(
                Branch::ResponseFormat,
                self.classification.classify(message, Strategy::ResponseFormat)
            ),
            settle(
                Branch::ToolCall,
                self.classification.classify(message, Strategy::ToolCall)
            ),
        );

        let record = compare_branches(response_format, tool_call)?;
        log_record(&record);
        Ok(record)
    }

    /// Structured vs unstructured comparison reporting each stage to `sink`.
    ///
    /// Always ends with a `final` frame, carrying the record on success or the
    /// combined failure otherwise.
    pub async fn compare_streaming(
        &self,
        message: &str,
        method: ExtractionMethod,
        sink: UnboundedSender<ProgressFrame>,
    ) {
        if let Err(e) = ensure_message(message) {
            emit(
                &sink,
                ProgressFrame::new(FrameType::Final, Stage::Error, 100, e.to_string()),
            );
            return;
        }

        let (structured, unstructured) = tokio::join!(
            settle(Branch::ResponseFormat, self.stream_structured(message, &sink)),
            settle(
                Branch::Unstructured,
                self.stream_unstructured(message, method, &sink)
            ),
        );

        let frame = match compare_branches(structured, unstructured) {
            Ok(record) => {
                log_record(&record);
                let summary = json!({
                    "faster": record.faster,
                    "time_difference_ms": record.time_difference_ms,
                    "confidence_delta": record.confidence_delta,
                });
                ProgressFrame::finished(
                    "Comparison complete",
                    serde_json::to_value(&record.left).unwrap_or_default(),
                    serde_json::to_value(&record.right).unwrap_or_default(),
                )
                .with_data(summary)
            }
            Err(ComparisonError::BothFailed { left, right }) => {
                tracing::warn!("Streamed comparison failed on both branches");
                ProgressFrame::finished(
                    "Both comparison branches failed",
                    serde_json::to_value(&left).unwrap_or_default(),
                    serde_json::to_value(&right).unwrap_or_default(),
                )
            }
            Err(e) => ProgressFrame::new(FrameType::Final, Stage::Error, 100, e.to_string()),
        };
        emit(&sink, frame);
    }

    async fn stream_structured(
        &self,
        message: &str,
        sink: &UnboundedSender<ProgressFrame>,
    ) -> Result<ClassifiedTicket, ClassificationError> {
        let frame = |stage, progress, details: &str| {
            ProgressFrame::new(FrameType::Structured, stage, progress, details)
        };

        emit(sink, frame(Stage::Parsing, 5, "Parsing customer message"));
        emit(
            sink,
            frame(Stage::Analyzing, 15, "Requesting schema-constrained completion"),
        );

        let start = Instant::now();
        let progress_sink = sink.clone();
        let output = self
            .classification
            .generator()
            .generate_streaming(message, Strategy::ResponseFormat, move |len| {
                let progress = (20 + len / 10).min(80) as u8;
                emit(
                    &progress_sink,
                    ProgressFrame::new(
                        FrameType::Structured,
                        Stage::Structuring,
                        progress,
                        format!("Received {} characters", len),
                    ),
                );
            })
            .await;

        let result = match output {
            Ok(output) => {
                emit(
                    sink,
                    frame(Stage::Validating, 90, "Validating against the ticket schema"),
                );
                self.classification.decode_output(output, start)
            }
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(ticket) => emit(
                sink,
                frame(Stage::Complete, 100, "Structured output validated")
                    .with_data(serde_json::to_value(&ticket.ticket).unwrap_or_default()),
            ),
            Err(e) => emit(sink, frame(Stage::Error, 100, &e.to_string())),
        }

        result
    }

    async fn stream_unstructured(
        &self,
        message: &str,
        method: ExtractionMethod,
        sink: &UnboundedSender<ProgressFrame>,
    ) -> Result<UnstructuredAnalysis, GenerationError> {
        let frame = |stage, progress, details: &str| {
            ProgressFrame::new(FrameType::Unstructured, stage, progress, details)
        };

        emit(sink, frame(Stage::Parsing, 5, "Parsing customer message"));
        emit(sink, frame(Stage::Analyzing, 15, "Requesting free-text completion"));

        let result = self.unstructured.analyze(message, method).await;

        match &result {
            Ok(analysis) => {
                emit(
                    sink,
                    frame(
                        Stage::Structuring,
                        70,
                        &format!("Extracted fields using {}", method.as_str()),
                    ),
                );
                emit(
                    sink,
                    frame(
                        Stage::Validating,
                        90,
                        &format!(
                            "Extraction confidence {:.2} with {} defect(s)",
                            analysis.extraction.confidence,
                            analysis.extraction.errors.len()
                        ),
                    ),
                );
                emit(
                    sink,
                    frame(Stage::Complete, 100, "Free-text extraction finished")
                        .with_data(serde_json::to_value(&analysis.extraction).unwrap_or_default()),
                );
            }
            Err(e) => emit(sink, frame(Stage::Error, 100, &e.to_string())),
        }

        result
    }
}

fn ensure_message(message: &str) -> Result<(), ComparisonError> {
    if message.trim().is_empty() {
        return Err(ComparisonError::EmptyInput);
    }
    Ok(())
}

fn log_record<L, R>(record: &ComparisonRecord<L, R>) {
    tracing::info!(
        left = ?record.left.branch,
        right = ?record.right.branch,
        left_ms = record.left.processing_time_ms,
        right_ms = record.right.processing_time_ms,
        faster = ?record.faster,
        partial = record.is_partial(),
        "Comparison finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;
    use futures::channel::mpsc;

    use crate::model::{LlmConfig, RetrySettings};
    use crate::service::generation::ConstrainedGenerator;
    use crate::service::llm::testing::{FakeProvider, completion_for};
    use crate::service::llm::{ChatProvider, ProviderError};

    const TICKET: &str = r#"{"sentiment":"positive","department":"shipping_and_delivery","reply":"Thank you, we're glad your delivery was quick!","confidence":0.9,"priority":"low"}"#;
    const FREE_TEXT: &str = "Sentiment: positive\n\nReply: Thank you so much, we're glad the delivery was fast!";

    struct Sample(u64, Option<f64>);

    impl BranchResult for Sample {
        fn processing_time_ms(&self) -> u64 {
            self.0
        }

        fn confidence(&self) -> Option<f64> {
            self.1
        }
    }

    fn ok(branch: Branch, ms: u64, confidence: f64) -> Settled<Sample, GenerationError> {
        Settled {
            branch,
            result: Ok(Sample(ms, Some(confidence))),
            elapsed_ms: ms,
        }
    }

    fn err(branch: Branch, ms: u64) -> Settled<Sample, GenerationError> {
        Settled {
            branch,
            result: Err(GenerationError::Provider(ProviderError::Network(
                "timeout".to_string(),
            ))),
            elapsed_ms: ms,
        }
    }

    fn comparison_service(provider: Arc<dyn ChatProvider>) -> ComparisonService {
        let config = LlmConfig {
            retry: RetrySettings {
                max_attempts: 2,
                base_delay_ms: 1,
            },
            ..LlmConfig::default()
        };
        let generator = Arc::new(ConstrainedGenerator::new(provider, config));
        ComparisonService::new(
            Arc::new(ClassificationService::new(generator.clone())),
            Arc::new(UnstructuredService::new(generator)),
        )
    }

    /// Structured requests get `structured`, free-text requests get `FREE_TEXT`
    fn routed_provider(structured: Result<&'static str, ProviderError>) -> FakeProvider {
        FakeProvider::new(move |request| match (&request.constraint, &structured) {
            (None, _) => Ok(completion_for(request, FREE_TEXT)),
            (Some(_), Ok(text)) => Ok(completion_for(request, text)),
            (Some(_), Err(e)) => Err(e.clone()),
        })
    }

    #[test]
    fn test_both_succeed() {
        let record = compare_branches(
            ok(Branch::ResponseFormat, 120, 0.9),
            ok(Branch::ToolCall, 80, 0.6),
        )
        .unwrap();

        assert_eq!(record.faster, Some(Branch::ToolCall));
        assert_eq!(record.time_difference_ms, Some(40));
        assert!((record.confidence_delta.unwrap() - 0.3).abs() < 1e-9);
        assert!(!record.is_partial());
    }

    #[test]
    fn test_tie_goes_to_left() {
        let record = compare_branches(
            ok(Branch::ResponseFormat, 50, 0.5),
            ok(Branch::Unstructured, 50, 0.5),
        )
        .unwrap();
        assert_eq!(record.faster, Some(Branch::ResponseFormat));
        assert_eq!(record.time_difference_ms, Some(0));
    }

    #[test]
    fn test_partial_keeps_failure_marker() {
        let record = compare_branches(
            err(Branch::ResponseFormat, 30),
            ok(Branch::Unstructured, 70, 0.4),
        )
        .unwrap();

        assert!(record.is_partial());
        assert_eq!(record.faster, None);
        assert_eq!(record.time_difference_ms, None);
        assert_eq!(record.confidence_delta, None);
        assert_eq!(record.left.processing_time_ms, 30);
        assert!(matches!(
            &record.left.outcome,
            BranchOutcome::Failed { kind, .. } if kind == "provider_error"
        ));
        assert!(record.right.outcome.is_success());
    }

    #[test]
    fn test_both_failed() {
        let result = compare_branches(err(Branch::ResponseFormat, 1), err(Branch::ToolCall, 2));
        let Err(ComparisonError::BothFailed { left, right }) = result else {
            panic!("expected combined failure");
        };
        assert_eq!(left.branch, Branch::ResponseFormat);
        assert_eq!(right.branch, Branch::ToolCall);
        assert_eq!(right.kind, "provider_error");
    }

    #[tokio::test]
    async fn test_failing_structured_branch_yields_partial_record() {
        let provider = Arc::new(routed_provider(Err(ProviderError::Auth(
            "invalid key".to_string(),
        ))));
        let service = comparison_service(provider);

        let record = service
            .compare_structured_vs_unstructured(
                "Great service! The delivery was super fast this time.",
                ExtractionMethod::KeywordRules,
            )
            .await
            .unwrap();

        assert!(record.is_partial());
        assert!(matches!(
            &record.left.outcome,
            BranchOutcome::Failed { kind, .. } if kind == "provider_error"
        ));
        let analysis = record.right.outcome.data().unwrap();
        assert_eq!(
            analysis.extraction.reply.as_deref(),
            Some("Thank you so much, we're glad the delivery was fast!")
        );
    }

    #[tokio::test]
    async fn test_invalid_structured_output_reported_as_validation_failure() {
        let provider = Arc::new(routed_provider(Ok(r#"{"sentiment":"ecstatic"}"#)));
        let record = comparison_service(provider)
            .compare_structured_vs_unstructured("Thanks!", ExtractionMethod::DelimiterScan)
            .await
            .unwrap();

        assert!(matches!(
            &record.left.outcome,
            BranchOutcome::Failed { kind, .. } if kind == "validation_error"
        ));
    }

    #[tokio::test]
    async fn test_compare_strategies_runs_concurrently() {
        let provider =
            Arc::new(FakeProvider::replying(TICKET).with_delay(Duration::from_millis(100)));
        let service = comparison_service(provider.clone());

        let start = Instant::now();
        let record = service.compare_strategies("Fast delivery, thanks").await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(190));
        assert_eq!(provider.calls(), 2);
        assert_eq!(record.left.branch, Branch::ResponseFormat);
        assert_eq!(record.right.branch, Branch::ToolCall);
        assert_eq!(record.confidence_delta, Some(0.0));
        assert!(record.faster.is_some());
    }

    #[tokio::test]
    async fn test_both_branches_failing() {
        let provider = Arc::new(FakeProvider::failing(ProviderError::Rejected {
            status: 400,
            message: "bad model".to_string(),
        }));
        let result = comparison_service(provider)
            .compare_structured_vs_unstructured("Help", ExtractionMethod::KeywordRules)
            .await;
        assert!(matches!(result, Err(ComparisonError::BothFailed { .. })));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let provider = Arc::new(FakeProvider::replying(TICKET));
        let service = comparison_service(provider.clone());
        assert_eq!(
            service.compare_strategies(" ").await.unwrap_err(),
            ComparisonError::EmptyInput
        );
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_streaming_frames_end_with_final() {
        let provider = Arc::new(routed_provider(Ok(TICKET)));
        let service = comparison_service(provider);
        let (tx, rx) = mpsc::unbounded();

        service
            .compare_streaming("Loved the quick delivery", ExtractionMethod::KeywordRules, tx)
            .await;
        let frames: Vec<ProgressFrame> = rx.collect().await;

        let last = frames.last().unwrap();
        assert_eq!(last.frame_type, FrameType::Final);
        assert_eq!(last.status, Stage::Final);
        assert_eq!(last.structured.as_ref().unwrap()["branch"], "response_format");
        assert_eq!(last.unstructured.as_ref().unwrap()["branch"], "unstructured");
        assert!(last.data.as_ref().unwrap().get("faster").is_some());

        let structured_stages: Vec<Stage> = frames
            .iter()
            .filter(|f| f.frame_type == FrameType::Structured)
            .map(|f| f.status)
            .collect();
        assert_eq!(structured_stages.first(), Some(&Stage::Parsing));
        assert_eq!(structured_stages.last(), Some(&Stage::Complete));
        assert!(structured_stages.contains(&Stage::Structuring));
        assert!(structured_stages.contains(&Stage::Validating));

        let progress: Vec<u8> = frames
            .iter()
            .filter(|f| f.frame_type == FrameType::Structured)
            .map(|f| f.progress)
            .collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_streaming_empty_message_sends_error_final() {
        let service = comparison_service(Arc::new(FakeProvider::replying(TICKET)));
        let (tx, rx) = mpsc::unbounded();
        service
            .compare_streaming("", ExtractionMethod::KeywordRules, tx)
            .await;

        let frames: Vec<ProgressFrame> = rx.collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::Final);
        assert_eq!(frames[0].status, Stage::Error);
    }
}
