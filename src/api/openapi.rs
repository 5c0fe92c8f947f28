//! OpenAPI specification endpoints

use actix_web::{HttpResponse, Responder, get};
use utoipa::OpenApi;

use crate::api::error::ErrorResponse;
use crate::api::{batch, health, triage};
use crate::model::{
    BatchItem, BatchJob, Department, ExtractionMethod, ExtractionResult, ItemResult, ItemStatus,
    JobStatus, Priority, ProcessingMode, Sentiment, SupportTicket, TokenUsage,
};
use crate::service::batch::{BatchRequest, BatchSubmission};
use crate::service::decode::ParseFailure;
use crate::service::generation::Strategy;
use crate::service::schema::{IssueCode, ValidationIssue};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Support Triage API",
        description = "Schema-constrained LLM triage of customer messages, with free-text extraction for comparison"
    ),
    paths(
        triage::process,
        triage::process_tool,
        triage::process_raw,
        triage::compare,
        triage::compare_methods,
        triage::compare_stream,
        batch::submit_batch,
        batch::list_batches,
        batch::get_batch,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        SupportTicket,
        Sentiment,
        Department,
        Priority,
        TokenUsage,
        Strategy,
        ExtractionMethod,
        ExtractionResult,
        ErrorResponse,
        ValidationIssue,
        IssueCode,
        ParseFailure,
        triage::ProcessRequest,
        BatchRequest,
        BatchSubmission,
        BatchJob,
        BatchItem,
        ItemResult,
        ItemStatus,
        JobStatus,
        ProcessingMode,
        batch::BatchJobSummary,
        health::HealthStatus,
        health::ReadinessStatus,
        health::DependencyHealth,
    )),
    tags(
        (name = "triage", description = "Single-message classification"),
        (name = "comparison", description = "Side-by-side generation strategies"),
        (name = "batch", description = "Background batch jobs"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON specification
#[get("/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Serve OpenAPI YAML specification
#[get("/openapi.yaml")]
pub async fn openapi_yaml() -> impl Responder {
    match ApiDoc::openapi().to_yaml() {
        Ok(yaml) => HttpResponse::Ok().content_type("text/yaml").body(yaml),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render OpenAPI YAML");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Configure OpenAPI routes
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(openapi_json).service(openapi_yaml);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/process",
            "/v1/process/tool",
            "/v1/process-raw",
            "/v1/compare",
            "/v1/compare/methods",
            "/v1/compare/stream",
            "/v1/batch",
            "/v1/batch/{id}",
            "/health/live",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_yaml_renders() {
        let yaml = ApiDoc::openapi().to_yaml().unwrap();
        assert!(yaml.contains("SupportTicket"));
    }
}
