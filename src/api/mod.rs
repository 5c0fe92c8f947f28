pub mod batch;
pub mod error;
pub mod health;
pub mod openapi;
pub mod triage;

use actix_web::web;

use error::ApiError;

/// Route malformed JSON bodies through the common error envelope
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}
