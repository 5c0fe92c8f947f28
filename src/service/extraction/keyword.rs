//! Keyword-rule extraction

use regex::Regex;

use crate::model::{ExtractionMethod, ExtractionResult};

use super::categories::CategoryRules;
use super::{BRIEF_RESPONSE_CHARS, BRIEF_RESPONSE_DEFECT, clamp_confidence, longest_paragraph, paragraphs};

const BASE_CONFIDENCE: f64 = 0.2;
const LABEL_BOOST: f64 = 0.2;
const PARAGRAPH_BOOST: f64 = 0.05;
const WHOLE_TEXT_CAP: f64 = 0.3;

pub struct KeywordExtractor {
    rules: CategoryRules,
    reply_label: Regex,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self {
            rules: CategoryRules::new(),
            reply_label: Regex::new(r"(?is)\breply\s*:\**\s*(.+)").unwrap(),
        }
    }

    pub fn extract(&self, text: &str) -> ExtractionResult {
        let mut confidence = BASE_CONFIDENCE;
        let mut errors = Vec::new();

        let inferred = self.rules.infer(text);
        inferred.score(&mut confidence, &mut errors);

        let labeled = self
            .reply_label
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|r| !r.is_empty());

        let reply = if let Some(reply) = labeled {
            confidence += LABEL_BOOST;
            Some(reply.to_string())
        } else if paragraphs(text).len() >= 2 {
            confidence += PARAGRAPH_BOOST;
            errors.push("used fallback paragraph extraction".to_string());
            longest_paragraph(text).map(str::to_string)
        } else if !text.trim().is_empty() {
            errors.push("no reply label found, used entire response".to_string());
            confidence = confidence.min(WHOLE_TEXT_CAP);
            Some(text.trim().to_string())
        } else {
            errors.push("response was empty".to_string());
            None
        };

        if text.trim().chars().count() < BRIEF_RESPONSE_CHARS {
            errors.push(BRIEF_RESPONSE_DEFECT.to_string());
        }

        ExtractionResult {
            sentiment: Some(inferred.sentiment.value),
            department: Some(inferred.department.value),
            priority: Some(inferred.priority.value),
            reply,
            confidence: clamp_confidence(confidence),
            errors,
            method: ExtractionMethod::KeywordRules,
        }
    }
}
