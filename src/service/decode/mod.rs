//! Decode & validate raw model output
//!
//! Raw text becomes one of three tagged outcomes. A parse failure is never
//! reported as a validation failure, and a recovered JSON candidate is only
//! attached for diagnostics.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::SupportTicket;
use crate::service::schema::{self, ValidationFailure};

pub mod candidate;

pub use candidate::extract_json_candidate;

/// Raw output that is not syntactically valid JSON
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ParseFailure {
    /// Parser diagnostic
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// Best-effort JSON fragment found in the raw text, for display only
    pub candidate: Option<String>,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid JSON at line {} column {}: {}",
            self.line, self.column, self.message
        )
    }
}

/// Result of decoding one raw completion
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Parsed {
        ticket: SupportTicket,
        elapsed: Duration,
    },
    ParseFailed(ParseFailure),
    ValidationFailed(ValidationFailure),
}

impl DecodeOutcome {
    pub fn into_result(self) -> Result<SupportTicket, DecodeFailure> {
        match self {
            DecodeOutcome::Parsed { ticket, .. } => Ok(ticket),
            DecodeOutcome::ParseFailed(failure) => Err(DecodeFailure::Parse(failure)),
            DecodeOutcome::ValidationFailed(failure) => Err(DecodeFailure::Validation(failure)),
        }
    }
}

/// Failure half of a [`DecodeOutcome`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("{0}")]
    Parse(ParseFailure),

    #[error("{0}")]
    Validation(ValidationFailure),
}

/// Strictly parse `raw` as JSON and validate it against the ticket schema
pub fn decode(raw: &str) -> DecodeOutcome {
    let started = Instant::now();

    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            let failure = ParseFailure {
                message: e.to_string(),
                line: e.line(),
                column: e.column(),
                candidate: extract_json_candidate(raw),
            };
            tracing::debug!(
                line = failure.line,
                column = failure.column,
                has_candidate = failure.candidate.is_some(),
                "Model output is not valid JSON"
            );
            return DecodeOutcome::ParseFailed(failure);
        }
    };

    match schema::validate(&value) {
        Ok(ticket) => DecodeOutcome::Parsed {
            ticket,
            elapsed: started.elapsed(),
        },
        Err(failure) => {
            tracing::debug!(
                issue_count = failure.issues.len(),
                "Model output failed schema validation"
            );
            DecodeOutcome::ValidationFailed(failure)
        }
    }
}

/// Locate a JSON candidate in free text and decode it.
///
/// Diagnostic helper for unconstrained output: shows whether the model
/// happened to produce a valid ticket. Text with no candidate is decoded
/// as-is so the parse failure carries the parser's diagnostic.
pub fn decode_candidate(text: &str) -> DecodeOutcome {
    match extract_json_candidate(text) {
        Some(candidate) => decode(&candidate),
        None => decode(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Department, Priority, Sentiment};
    use crate::service::schema::IssueCode;

    const VALID: &str = r#"{"sentiment":"negative","department":"customer_support","reply":"Sorry","confidence":0.9,"priority":"high"}"#;

    #[test]
    fn test_decode_valid() {
        match decode(VALID) {
            DecodeOutcome::Parsed { ticket, .. } => {
                assert_eq!(ticket.sentiment, Sentiment::Negative);
                assert_eq!(ticket.department, Department::CustomerSupport);
                assert_eq!(ticket.priority, Priority::High);
            }
            other => panic!("expected Parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_parse_failure() {
        for raw in [
            "",
            "not json",
            "{\"sentiment\": ",
            "{'single': 'quotes'}",
            "{\"a\": 1,}",
        ] {
            assert!(
                matches!(decode(raw), DecodeOutcome::ParseFailed(_)),
                "{:?} was not a parse failure",
                raw
            );
        }
    }

    #[test]
    fn test_parse_failure_carries_candidate() {
        let raw = format!("Here is the ticket:\n```json\n{}\n```", VALID);
        let DecodeOutcome::ParseFailed(failure) = decode(&raw) else {
            panic!("fenced text must not decode strictly");
        };
        assert_eq!(failure.candidate.as_deref(), Some(VALID));
        assert_eq!(failure.line, 1);
    }

    #[test]
    fn test_valid_json_wrong_shape_is_validation_failure() {
        let DecodeOutcome::ValidationFailed(failure) = decode(r#"{"sentiment":"positive"}"#)
        else {
            panic!("expected validation failure");
        };
        assert!(
            failure
                .issues
                .iter()
                .any(|i| i.path == "reply" && i.code == IssueCode::MissingField)
        );
    }

    #[test]
    fn test_decode_candidate_fenced_block() {
        let raw = "```json\n{\"sentiment\":\"negative\",\"department\":\"customer_support\",\"reply\":\"Sorry\",\"confidence\":0.9,\"priority\":\"high\"}\n```";
        let ticket = decode_candidate(raw).into_result().unwrap();
        assert_eq!(ticket.sentiment, Sentiment::Negative);
        assert_eq!(ticket.reply, "Sorry");
    }

    #[test]
    fn test_decode_candidate_without_json() {
        assert!(matches!(
            decode_candidate("I think the customer is upset."),
            DecodeOutcome::ParseFailed(ParseFailure {
                candidate: None,
                ..
            })
        ));
    }
}
