//! Batch processing service
//!
//! A submission is admitted, stored and answered with its job id right away.
//! Items are processed in a background task with bounded concurrency and
//! written back by index, so completion order does not matter.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::{BatchConfig, BatchJob, ExtractionMethod, ItemResult, ProcessingMode};
use crate::service::classification::ClassificationService;
use crate::service::extraction::UnstructuredService;
use crate::service::generation::Strategy;

pub mod error;
pub mod store;

pub use error::BatchError;
pub use store::{InMemoryJobStore, JobStore};

const DEFAULT_JOB_NAME: &str = "Untitled batch";

/// Batch submission body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub mode: ProcessingMode,
    /// Extraction strategy for unstructured mode
    #[serde(default)]
    pub method: ExtractionMethod,
    pub messages: Vec<String>,
}

/// Accepted submission
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BatchSubmission {
    pub job_id: String,
    pub total_items: usize,
    /// Rejected or truncated messages
    pub warnings: Vec<String>,
}

/// Messages that passed the admission policy
#[derive(Debug, Clone, PartialEq)]
pub struct Admitted {
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
}

/// Apply the length policy to submitted messages.
///
/// Messages are trimmed. Fewer than `min_message_len` characters is a
/// rejection; more than `max_message_len` is truncated. Both bounds are
/// inclusive. Warnings use 1-based positions.
pub fn admit_messages(raw: Vec<String>, config: &BatchConfig) -> Admitted {
    let mut messages = Vec::with_capacity(raw.len());
    let mut warnings = Vec::new();

    for (position, message) in raw.into_iter().enumerate().map(|(i, m)| (i + 1, m)) {
        let trimmed = message.trim();
        let len = trimmed.chars().count();

        if len < config.min_message_len {
            warnings.push(format!(
                "Message {} rejected: shorter than {} characters",
                position, config.min_message_len
            ));
        } else if len > config.max_message_len {
            warnings.push(format!(
                "Message {} truncated to {} characters",
                position, config.max_message_len
            ));
            messages.push(trimmed.chars().take(config.max_message_len).collect());
        } else {
            messages.push(trimmed.to_string());
        }
    }

    Admitted { messages, warnings }
}

#[derive(Clone)]
pub struct BatchService {
    store: Arc<dyn JobStore>,
    classification: Arc<ClassificationService>,
    unstructured: Arc<UnstructuredService>,
    config: BatchConfig,
}

impl BatchService {
    pub fn new(
        store: Arc<dyn JobStore>,
        classification: Arc<ClassificationService>,
        unstructured: Arc<UnstructuredService>,
        config: BatchConfig,
    ) -> Self {
        tracing::info!(
            concurrency = config.concurrency,
            "Batch service initialized"
        );
        Self {
            store,
            classification,
            unstructured,
            config,
        }
    }

    /// Admit, store and start processing a batch
    pub async fn submit(&self, request: BatchRequest) -> Result<BatchSubmission, BatchError> {
        let Admitted { messages, warnings } = admit_messages(request.messages, &self.config);

        if messages.is_empty() {
            return Err(BatchError::NoValidMessages { warnings });
        }

        let job_id = format!("batch_{}", Uuid::new_v4().simple());
        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_JOB_NAME.to_string());
        let job = BatchJob::new(job_id.clone(), name, request.mode, messages.clone());
        let total_items = job.total_items;

        self.store.insert(job).await;

        tracing::info!(
            job_id = %job_id,
            mode = ?request.mode,
            total_items = total_items,
            rejected = warnings.len(),
            "Batch job submitted"
        );

        let worker = self.clone();
        let id = job_id.clone();
        let (mode, method) = (request.mode, request.method);
        tokio::spawn(async move {
            worker.run(&id, messages, mode, method).await;
        });

        Ok(BatchSubmission {
            job_id,
            total_items,
            warnings,
        })
    }

    pub async fn get(&self, id: &str) -> Result<BatchJob, BatchError> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| BatchError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<BatchJob> {
        self.store.list().await
    }

    async fn run(
        &self,
        job_id: &str,
        messages: Vec<String>,
        mode: ProcessingMode,
        method: ExtractionMethod,
    ) {
        let start = Instant::now();
        if let Err(e) = self.store.update(job_id, Box::new(|job: &mut BatchJob| job.start())).await {
            tracing::error!(job_id = %job_id, error = %e, "Batch job vanished before start");
            return;
        }

        let mut results = stream::iter(messages.into_iter().enumerate())
            .map(|(index, message)| async move {
                if let Err(e) = self
                    .store
                    .update(job_id, Box::new(move |job: &mut BatchJob| job.mark_processing(index)))
                    .await
                {
                    tracing::warn!(
                        job_id = %job_id,
                        index = index,
                        error = %e,
                        "Failed to mark batch item processing"
                    );
                }
                let item_start = Instant::now();
                let outcome = self.process_item(&message, mode, method).await;
                (index, outcome, item_start.elapsed().as_millis() as u64)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((index, outcome, elapsed_ms)) = results.next().await {
            if let Err(e) = &outcome {
                tracing::debug!(job_id = %job_id, index = index, error = %e, "Batch item failed");
            }
            let update = Box::new(move |job: &mut BatchJob| job.record_item(index, outcome, elapsed_ms));
            if let Err(e) = self.store.update(job_id, update).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to record batch item");
            }
        }

        if let Err(e) = self.store.update(job_id, Box::new(|job: &mut BatchJob| job.finish())).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to finish batch job");
        }

        if let Some(job) = self.store.get(job_id).await {
            tracing::info!(
                job_id = %job_id,
                status = ?job.status,
                successful = job.successful_items,
                failed = job.failed_items,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Batch job finished"
            );
        }
    }

    async fn process_item(
        &self,
        message: &str,
        mode: ProcessingMode,
        method: ExtractionMethod,
    ) -> Result<ItemResult, String> {
        match mode {
            ProcessingMode::Structured => self
                .classification
                .classify(message, Strategy::ResponseFormat)
                .await
                .map(|classified| ItemResult::Ticket {
                    ticket: classified.ticket,
                })
                .map_err(|e| e.to_string()),
            ProcessingMode::Unstructured => self
                .unstructured
                .analyze(message, method)
                .await
                .map(|analysis| ItemResult::Extraction {
                    raw_output: analysis.raw_output,
                    extraction: analysis.extraction,
                })
                .map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::model::{ItemStatus, JobStatus, LlmConfig, RetrySettings, Sentiment};
    use crate::service::generation::ConstrainedGenerator;
    use crate::service::llm::ProviderError;
    use crate::service::llm::testing::{FakeProvider, completion_for};

    const TICKET: &str = r#"{"sentiment":"negative","department":"product_quality","reply":"Sorry to hear that, a replacement is on its way.","confidence":0.8,"priority":"medium"}"#;

    fn config() -> BatchConfig {
        BatchConfig::default()
    }

    fn strings(messages: &[&str]) -> Vec<String> {
        messages.iter().map(|m| m.to_string()).collect()
    }

    fn service() -> BatchService {
        service_with_store(Arc::new(InMemoryJobStore::new()))
    }

    fn service_with_store(store: Arc<dyn JobStore>) -> BatchService {
        // Messages mentioning "fail" get a provider rejection
        let provider = Arc::new(
            FakeProvider::new(|request| {
                if request.messages[1].content.contains("fail") {
                    Err(ProviderError::Rejected {
                        status: 400,
                        message: "rejected".to_string(),
                    })
                } else if request.constraint.is_some() {
                    Ok(completion_for(request, TICKET))
                } else {
                    Ok(completion_for(request, "Reply: Sorry, we're sending a replacement today."))
                }
            })
            .with_delay(Duration::from_millis(5)),
        );
        let llm = LlmConfig {
            retry: RetrySettings {
                max_attempts: 1,
                base_delay_ms: 1,
            },
            ..LlmConfig::default()
        };
        let generator = Arc::new(ConstrainedGenerator::new(provider, llm));
        BatchService::new(
            store,
            Arc::new(ClassificationService::new(generator.clone())),
            Arc::new(UnstructuredService::new(generator)),
            BatchConfig {
                concurrency: 3,
                ..BatchConfig::default()
            },
        )
    }

    async fn wait_for_completion(service: &BatchService, id: &str) -> BatchJob {
        for _ in 0..200 {
            let job = service.get(id).await.unwrap();
            if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch job {} did not finish", id);
    }

    #[test]
    fn test_admission_length_boundaries() {
        let exactly_max = "a".repeat(1000);
        let over_max = "b".repeat(1001);
        let admitted = admit_messages(
            vec![
                "abcd".to_string(),
                "abcde".to_string(),
                exactly_max.clone(),
                over_max,
            ],
            &config(),
        );

        assert_eq!(admitted.messages.len(), 3);
        assert_eq!(admitted.messages[0], "abcde");
        assert_eq!(admitted.messages[1], exactly_max);
        assert_eq!(admitted.messages[2], "b".repeat(1000));
        assert_eq!(
            admitted.warnings,
            vec![
                "Message 1 rejected: shorter than 5 characters".to_string(),
                "Message 4 truncated to 1000 characters".to_string(),
            ]
        );
    }

    #[test]
    fn test_admission_trims_before_measuring() {
        let admitted = admit_messages(strings(&["   hi    ", "  hello  "]), &config());
        assert_eq!(admitted.messages, vec!["hello".to_string()]);
        assert_eq!(admitted.warnings.len(), 1);
    }

    #[test]
    fn test_admission_counts_characters_not_bytes() {
        let accented = "é".repeat(1000);
        let admitted = admit_messages(vec![accented.clone()], &config());
        assert_eq!(admitted.messages, vec![accented]);
        assert!(admitted.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_batch_without_valid_messages() {
        let service = service();
        let result = service
            .submit(BatchRequest {
                name: None,
                mode: ProcessingMode::Structured,
                method: ExtractionMethod::default(),
                messages: strings(&["hi", ""]),
            })
            .await;

        assert!(matches!(
            result,
            Err(BatchError::NoValidMessages { ref warnings }) if warnings.len() == 2
        ));
        assert!(service.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_structured_batch_keeps_submission_order() {
        let service = service();
        let submission = service
            .submit(BatchRequest {
                name: Some("returns".to_string()),
                mode: ProcessingMode::Structured,
                method: ExtractionMethod::default(),
                messages: strings(&[
                    "The kettle stopped working",
                    "please fail this one",
                    "Handle is cracked on arrival",
                    "x",
                ]),
            })
            .await
            .unwrap();

        assert!(submission.job_id.starts_with("batch_"));
        assert_eq!(submission.total_items, 3);
        assert_eq!(submission.warnings.len(), 1);

        let job = wait_for_completion(&service, &submission.job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.name, "returns");
        assert_eq!(job.processed_items, 3);
        assert_eq!(job.successful_items, 2);
        assert_eq!(job.failed_items, 1);
        assert!((job.progress - 100.0).abs() < f64::EPSILON);

        assert_eq!(job.items[0].message, "The kettle stopped working");
        assert_eq!(job.items[1].status, ItemStatus::Failed);
        assert!(job.items[1].result.is_none());
        assert!(job.items[1].error.is_some());
        assert!(matches!(
            &job.items[2].result,
            Some(ItemResult::Ticket { ticket }) if ticket.sentiment == Sentiment::Negative
        ));
    }

    #[tokio::test]
    async fn test_unstructured_batch_stores_extractions() {
        let service = service();
        let submission = service
            .submit(BatchRequest {
                name: None,
                mode: ProcessingMode::Unstructured,
                method: ExtractionMethod::KeywordRules,
                messages: strings(&["My blender arrived broken"]),
            })
            .await
            .unwrap();

        let job = wait_for_completion(&service, &submission.job_id).await;
        assert_eq!(job.name, DEFAULT_JOB_NAME);
        let Some(ItemResult::Extraction { extraction, .. }) = &job.items[0].result else {
            panic!("expected extraction result");
        };
        assert_eq!(
            extraction.reply.as_deref(),
            Some("Sorry, we're sending a replacement today.")
        );
    }

    #[tokio::test]
    async fn test_all_failed_batch_is_failed() {
        let service = service();
        let submission = service
            .submit(BatchRequest {
                name: None,
                mode: ProcessingMode::Structured,
                method: ExtractionMethod::default(),
                messages: strings(&["fail number one", "fail number two"]),
            })
            .await
            .unwrap();

        let job = wait_for_completion(&service, &submission.job_id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.items.iter().all(|i| i.status == ItemStatus::Failed));
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        assert_eq!(
            service().get("batch_missing").await.unwrap_err(),
            BatchError::NotFound("batch_missing".to_string())
        );
    }

    /// Store that accepts only the first `allowed` updates
    struct FailingUpdates {
        inner: InMemoryJobStore,
        allowed: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl JobStore for FailingUpdates {
        async fn insert(&self, job: BatchJob) {
            self.inner.insert(job).await;
        }

        async fn get(&self, id: &str) -> Option<BatchJob> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Vec<BatchJob> {
            self.inner.list().await
        }

        async fn update(&self, id: &str, apply: store::JobUpdate) -> Result<(), BatchError> {
            let allowed = self
                .allowed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            match allowed {
                Ok(_) => self.inner.update(id, apply).await,
                Err(_) => Err(BatchError::NotFound(id.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_run_survives_store_update_failures() {
        let store = Arc::new(FailingUpdates {
            inner: InMemoryJobStore::new(),
            allowed: AtomicUsize::new(1),
        });
        let messages = strings(&["The kettle arrived broken", "The lid does not close"]);
        store
            .insert(BatchJob::new(
                "batch_flaky".to_string(),
                "flaky".to_string(),
                ProcessingMode::Structured,
                messages.clone(),
            ))
            .await;
        let service = service_with_store(store.clone());

        service
            .run(
                "batch_flaky",
                messages,
                ProcessingMode::Structured,
                ExtractionMethod::default(),
            )
            .await;

        // Only the start transition landed; later failures were logged, not fatal
        let job = service.get("batch_flaky").await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.successful_items + job.failed_items, 0);
    }
}
