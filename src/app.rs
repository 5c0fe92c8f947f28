//! Application state and service initialization
//!
//! All services are built once here and shared with the Actix-web handlers
//! through `web::Data`.

use std::sync::Arc;

use actix_web::web;

use crate::model::Config;
use crate::service::{
    BatchService, ChatProvider, ClassificationService, ComparisonService, ConstrainedGenerator,
    InMemoryJobStore, OpenAiClient, UnstructuredService,
};

/// Application state containing all services and shared resources
pub struct AppState {
    pub generator: Arc<ConstrainedGenerator>,
    pub classification: Arc<ClassificationService>,
    pub unstructured: Arc<UnstructuredService>,
    pub comparison: Arc<ComparisonService>,
    pub batch: Arc<BatchService>,
}

impl AppState {
    /// Build application state from configuration.
    ///
    /// Fails when `OPENAI_API_KEY` is missing or the HTTP client cannot be
    /// built from it.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or(AppError::MissingConfig("OPENAI_API_KEY"))?;

        let client = OpenAiClient::new(api_key, &config.llm)
            .map_err(|_| AppError::InvalidConfig("Invalid OPENAI_API_KEY"))?;

        tracing::info!(
            model = %config.llm.model,
            base_url = %config.llm.base_url,
            "LLM provider configured"
        );

        Ok(Self::with_provider(Arc::new(client), config))
    }

    /// Wire the service graph around any chat provider
    pub fn with_provider(provider: Arc<dyn ChatProvider>, config: Config) -> Self {
        let generator = Arc::new(ConstrainedGenerator::new(provider, config.llm));
        let classification = Arc::new(ClassificationService::new(Arc::clone(&generator)));
        let unstructured = Arc::new(UnstructuredService::new(Arc::clone(&generator)));
        let comparison = Arc::new(ComparisonService::new(
            Arc::clone(&classification),
            Arc::clone(&unstructured),
        ));
        let batch = Arc::new(BatchService::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::clone(&classification),
            Arc::clone(&unstructured),
            config.batch,
        ));

        Self {
            generator,
            classification,
            unstructured,
            comparison,
            batch,
        }
    }

    /// Register every service as handler data
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(crate::api::json_config())
            .app_data(web::Data::from(Arc::clone(&self.generator)))
            .app_data(web::Data::from(Arc::clone(&self.classification)))
            .app_data(web::Data::from(Arc::clone(&self.unstructured)))
            .app_data(web::Data::from(Arc::clone(&self.comparison)))
            .app_data(web::Data::from(Arc::clone(&self.batch)))
            .configure(crate::api::triage::configure)
            .configure(crate::api::batch::configure)
            .configure(crate::api::health::configure)
            .configure(crate::api::openapi::configure);
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

#[cfg(test)]
mod tests {
    use actix_web::{App, test};
    use serde_json::{Value, json};

    use super::*;
    use crate::service::llm::testing::FakeProvider;

    const TICKET: &str = r#"{"sentiment":"positive","department":"customer_support","reply":"Thank you for the kind words!","confidence":0.97,"priority":"low"}"#;

    #[actix_web::test]
    async fn test_missing_api_key() {
        let result = AppState::new(Config::default());
        assert!(matches!(
            result,
            Err(AppError::MissingConfig("OPENAI_API_KEY"))
        ));
    }

    #[actix_web::test]
    async fn test_wired_routes() {
        let state = AppState::with_provider(
            Arc::new(FakeProvider::replying(TICKET)),
            Config::default(),
        );
        let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/v1/process")
            .set_json(json!({ "message": "Your team was wonderful, thank you!" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["sentiment"], "positive");

        let req = test::TestRequest::get().uri("/openapi.json").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/health/ready").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
