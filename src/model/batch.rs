//! Batch job records kept by the job store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::extraction::ExtractionResult;
use super::ticket::SupportTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    Structured,
    Unstructured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Per-item output, shaped by the job's processing mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemResult {
    Ticket {
        ticket: SupportTicket,
    },
    Extraction {
        raw_output: String,
        extraction: ExtractionResult,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchItem {
    pub id: String,
    /// Position in the submitted message list
    pub index: usize,
    pub message: String,
    pub status: ItemStatus,
    pub result: Option<ItemResult>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchJob {
    pub id: String,
    pub name: String,
    pub mode: ProcessingMode,
    pub status: JobStatus,
    /// Percentage of processed items (0-100)
    pub progress: f64,
    pub total_items: usize,
    pub processed_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items: Vec<BatchItem>,
}

impl BatchJob {
    pub fn new(id: String, name: String, mode: ProcessingMode, messages: Vec<String>) -> Self {
        let items: Vec<BatchItem> = messages
            .into_iter()
            .enumerate()
            .map(|(index, message)| BatchItem {
                id: format!("item_{}", index),
                index,
                message,
                status: ItemStatus::Pending,
                result: None,
                error: None,
                processing_time_ms: None,
            })
            .collect();

        Self {
            id,
            name,
            mode,
            status: JobStatus::Pending,
            progress: 0.0,
            total_items: items.len(),
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            created_at: Utc::now(),
            completed_at: None,
            items,
        }
    }

    /// Mark the job running
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
    }

    pub fn mark_processing(&mut self, index: usize) {
        if let Some(item) = self.items.get_mut(index) {
            item.status = ItemStatus::Processing;
        }
    }

    /// Record the outcome of the item at `index` and refresh counters.
    ///
    /// Items may finish in any order; the index keeps results aligned with
    /// the submitted messages. Unknown indexes are ignored.
    pub fn record_item(
        &mut self,
        index: usize,
        outcome: Result<ItemResult, String>,
        processing_time_ms: u64,
    ) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };

        item.processing_time_ms = Some(processing_time_ms);
        match outcome {
            Ok(result) => {
                item.status = ItemStatus::Completed;
                item.result = Some(result);
                self.successful_items += 1;
            }
            Err(error) => {
                item.status = ItemStatus::Failed;
                item.error = Some(error);
                self.failed_items += 1;
            }
        }

        self.processed_items += 1;
        self.progress = if self.total_items == 0 {
            100.0
        } else {
            self.processed_items as f64 / self.total_items as f64 * 100.0
        };
    }

    /// Mark the job finished. A job where every item failed is `Failed`.
    pub fn finish(&mut self) {
        self.status = if self.total_items > 0 && self.failed_items == self.total_items {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(messages: &[&str]) -> BatchJob {
        BatchJob::new(
            "batch_test".to_string(),
            "test".to_string(),
            ProcessingMode::Structured,
            messages.iter().map(|m| m.to_string()).collect(),
        )
    }

    #[test]
    fn test_new_job_items_are_indexed() {
        let job = job(&["first message", "second message"]);
        assert_eq!(job.total_items, 2);
        assert_eq!(job.items[1].id, "item_1");
        assert_eq!(job.items[1].index, 1);
        assert!(job.items.iter().all(|i| i.status == ItemStatus::Pending));
    }

    #[test]
    fn test_record_item_out_of_order_keeps_alignment() {
        let mut job = job(&["first message", "second message"]);
        job.record_item(1, Err("provider down".to_string()), 12);
        assert_eq!(job.items[1].status, ItemStatus::Failed);
        assert_eq!(job.items[0].status, ItemStatus::Pending);
        assert_eq!(job.processed_items, 1);
        assert_eq!(job.failed_items, 1);
        assert!((job.progress - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finish_all_failed_marks_job_failed() {
        let mut job = job(&["only message"]);
        job.record_item(0, Err("boom".to_string()), 1);
        job.finish();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
    }
}
