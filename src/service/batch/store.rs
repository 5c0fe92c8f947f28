//! Batch job storage
//!
//! Jobs live behind [`JobStore`] so the backend can be swapped. The only
//! implementation keeps them in process memory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::BatchJob;

use super::error::BatchError;

/// Mutation applied to a stored job
pub type JobUpdate = Box<dyn FnOnce(&mut BatchJob) + Send>;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: BatchJob);

    async fn get(&self, id: &str) -> Option<BatchJob>;

    /// All jobs, newest first
    async fn list(&self) -> Vec<BatchJob>;

    async fn update(&self, id: &str, apply: JobUpdate) -> Result<(), BatchError>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, BatchJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: BatchJob) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    async fn get(&self, id: &str) -> Option<BatchJob> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<BatchJob> {
        let mut jobs: Vec<BatchJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    async fn update(&self, id: &str, apply: JobUpdate) -> Result<(), BatchError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| BatchError::NotFound(id.to_string()))?;
        apply(job);
        Ok(())
    }
}
