//! REST API endpoints for batch jobs

use actix_web::{HttpResponse, get, post, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ErrorResponse};
use crate::model::{BatchJob, JobStatus, ProcessingMode};
use crate::service::BatchService;
use crate::service::batch::{BatchRequest, BatchSubmission};

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Job overview without per-item results
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchJobSummary {
    pub id: String,
    pub name: String,
    pub mode: ProcessingMode,
    pub status: JobStatus,
    pub progress: f64,
    pub total_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<BatchJob> for BatchJobSummary {
    fn from(job: BatchJob) -> Self {
        Self {
            id: job.id,
            name: job.name,
            mode: job.mode,
            status: job.status,
            progress: job.progress,
            total_items: job.total_items,
            successful_items: job.successful_items,
            failed_items: job.failed_items,
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Submit a batch of messages for background processing
#[utoipa::path(
    post,
    path = "/v1/batch",
    request_body = BatchRequest,
    responses(
        (status = 202, description = "Job accepted", body = BatchSubmission),
        (status = 400, description = "No message passed admission", body = ErrorResponse)
    ),
    tag = "batch"
)]
#[post("/v1/batch")]
pub async fn submit_batch(
    service: web::Data<BatchService>,
    body: web::Json<BatchRequest>,
) -> Result<HttpResponse, ApiError> {
    let submission = service.submit(body.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(DataResponse::new(submission)))
}

/// List batch jobs, newest first
#[utoipa::path(
    get,
    path = "/v1/batch",
    responses(
        (status = 200, description = "Job summaries", body = Vec<BatchJobSummary>)
    ),
    tag = "batch"
)]
#[get("/v1/batch")]
pub async fn list_batches(service: web::Data<BatchService>) -> HttpResponse {
    let jobs: Vec<BatchJobSummary> = service
        .list()
        .await
        .into_iter()
        .map(BatchJobSummary::from)
        .collect();
    HttpResponse::Ok().json(DataResponse::new(jobs))
}

/// Get a batch job with its item results
#[utoipa::path(
    get,
    path = "/v1/batch/{id}",
    params(
        ("id" = String, Path, description = "Batch job ID")
    ),
    responses(
        (status = 200, description = "Job retrieved", body = BatchJob),
        (status = 404, description = "Job not found", body = ErrorResponse)
    ),
    tag = "batch"
)]
#[get("/v1/batch/{id}")]
pub async fn get_batch(
    service: web::Data<BatchService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let job = service.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DataResponse::new(job)))
}

/// Configure batch routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(submit_batch)
        .service(list_batches)
        .service(get_batch);
}
