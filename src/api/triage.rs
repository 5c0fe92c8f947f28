//! REST API endpoints for message triage and comparisons

use std::time::Instant;

use actix_web::{HttpResponse, post, web};
use futures::StreamExt;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ErrorResponse};
use crate::model::{ExtractionMethod, ProgressFrame, SupportTicket, TokenUsage};
use crate::service::generation::Strategy;
use crate::service::{ClassificationService, ComparisonService, UnstructuredService};

/// Message to triage
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessRequest {
    pub message: String,
}

/// Query parameters selecting the extraction strategy
#[derive(Debug, Deserialize, IntoParams)]
pub struct ExtractionParams {
    /// keyword (default) or delimiter
    pub strategy: Option<ExtractionMethod>,
}

/// Success envelope shared by the triage endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    /// Milliseconds spent serving the request
    pub processing_time: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T, processing_time: u64, method: &str, usage: Option<TokenUsage>) -> HttpResponse {
        HttpResponse::Ok().json(Self {
            success: true,
            data,
            processing_time,
            method: method.to_string(),
            usage,
        })
    }
}

fn require_message(message: &str) -> Result<&str, ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::EmptyInput);
    }
    Ok(message)
}

async fn classify(
    service: &ClassificationService,
    message: &str,
    strategy: Strategy,
) -> Result<HttpResponse, ApiError> {
    let classified = service.classify(require_message(message)?, strategy).await?;

    tracing::info!(
        strategy = strategy.as_str(),
        sentiment = classified.ticket.sentiment.as_str(),
        elapsed_ms = classified.processing_time_ms,
        "Message classified"
    );

    Ok(ApiResponse::ok(
        classified.ticket,
        classified.processing_time_ms,
        strategy.as_str(),
        classified.usage,
    ))
}

/// Classify a message with a response-format constraint
#[utoipa::path(
    post,
    path = "/v1/process",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Validated support ticket", body = SupportTicket),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 422, description = "Model output broke the ticket schema", body = ErrorResponse),
        (status = 429, description = "Provider rate limit", body = ErrorResponse),
        (status = 502, description = "Provider failure or unparseable output", body = ErrorResponse)
    ),
    tag = "triage"
)]
#[post("/v1/process")]
pub async fn process(
    service: web::Data<ClassificationService>,
    body: web::Json<ProcessRequest>,
) -> Result<HttpResponse, ApiError> {
    classify(&service, &body.message, Strategy::ResponseFormat).await
}

/// Classify a message through a forced tool call
#[utoipa::path(
    post,
    path = "/v1/process/tool",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Validated support ticket", body = SupportTicket),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 422, description = "Model output broke the ticket schema", body = ErrorResponse),
        (status = 502, description = "Provider failure or unparseable output", body = ErrorResponse)
    ),
    tag = "triage"
)]
#[post("/v1/process/tool")]
pub async fn process_tool(
    service: web::Data<ClassificationService>,
    body: web::Json<ProcessRequest>,
) -> Result<HttpResponse, ApiError> {
    classify(&service, &body.message, Strategy::ToolCall).await
}

/// Free-text completion followed by heuristic extraction
#[utoipa::path(
    post,
    path = "/v1/process-raw",
    request_body = ProcessRequest,
    params(ExtractionParams),
    responses(
        (status = 200, description = "Raw output and extracted fields"),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse)
    ),
    tag = "triage"
)]
#[post("/v1/process-raw")]
pub async fn process_raw(
    service: web::Data<UnstructuredService>,
    query: web::Query<ExtractionParams>,
    body: web::Json<ProcessRequest>,
) -> Result<HttpResponse, ApiError> {
    let method = query.strategy.unwrap_or_default();
    let analysis = service.analyze(require_message(&body.message)?, method).await?;
    let elapsed = analysis.processing_time_ms;
    let usage = analysis.usage;

    Ok(ApiResponse::ok(analysis, elapsed, method.as_str(), usage))
}

/// Response-format classification vs free text plus extraction
#[utoipa::path(
    post,
    path = "/v1/compare",
    request_body = ProcessRequest,
    params(ExtractionParams),
    responses(
        (status = 200, description = "Comparison record, possibly partial"),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 502, description = "Both branches failed", body = ErrorResponse)
    ),
    tag = "comparison"
)]
#[post("/v1/compare")]
pub async fn compare(
    service: web::Data<ComparisonService>,
    query: web::Query<ExtractionParams>,
    body: web::Json<ProcessRequest>,
) -> Result<HttpResponse, ApiError> {
    let start = Instant::now();
    let method = query.strategy.unwrap_or_default();
    let record = service
        .compare_structured_vs_unstructured(require_message(&body.message)?, method)
        .await?;

    Ok(ApiResponse::ok(
        record,
        start.elapsed().as_millis() as u64,
        "structured_vs_unstructured",
        None,
    ))
}

/// Response-format vs tool-call binding
#[utoipa::path(
    post,
    path = "/v1/compare/methods",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Comparison record, possibly partial"),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 502, description = "Both branches failed", body = ErrorResponse)
    ),
    tag = "comparison"
)]
#[post("/v1/compare/methods")]
pub async fn compare_methods(
    service: web::Data<ComparisonService>,
    body: web::Json<ProcessRequest>,
) -> Result<HttpResponse, ApiError> {
    let start = Instant::now();
    let record = service
        .compare_strategies(require_message(&body.message)?)
        .await?;

    Ok(ApiResponse::ok(
        record,
        start.elapsed().as_millis() as u64,
        "response_format_vs_tool_call",
        None,
    ))
}

fn sse_event(frame: &ProgressFrame) -> web::Bytes {
    let payload = serde_json::to_string(frame).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize progress frame");
        "{}".to_string()
    });
    web::Bytes::from(format!("data: {}\n\n", payload))
}

/// Structured vs unstructured comparison as server-sent progress events
#[utoipa::path(
    post,
    path = "/v1/compare/stream",
    request_body = ProcessRequest,
    params(ExtractionParams),
    responses(
        (status = 200, description = "text/event-stream of progress frames ending with a final frame"),
        (status = 400, description = "Empty message", body = ErrorResponse)
    ),
    tag = "comparison"
)]
#[post("/v1/compare/stream")]
pub async fn compare_stream(
    service: web::Data<ComparisonService>,
    query: web::Query<ExtractionParams>,
    body: web::Json<ProcessRequest>,
) -> Result<HttpResponse, ApiError> {
    let message = body.into_inner().message;
    require_message(&message)?;
    let method = query.strategy.unwrap_or_default();

    let (tx, rx) = mpsc::unbounded();
    let service = service.into_inner();
    actix_web::rt::spawn(async move {
        service.compare_streaming(&message, method, tx).await;
    });

    let events = rx.map(|frame| Ok::<_, actix_web::Error>(sse_event(&frame)));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events))
}

/// Configure triage and comparison routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(process)
        .service(process_tool)
        .service(process_raw)
        .service(compare)
        .service(compare_methods)
        .service(compare_stream);
}
