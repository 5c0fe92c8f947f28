//! Delimiter and pattern based reply extraction
//!
//! Tries explicit reply markers in priority order. Tag pairs are trusted
//! more than labels because a model rarely emits them by accident.

use regex::Regex;

use crate::model::{ExtractionMethod, ExtractionResult};

use super::categories::CategoryRules;
use super::{
    BRIEF_RESPONSE_CHARS, BRIEF_RESPONSE_DEFECT, CONFIDENCE_FLOOR, clamp_confidence, paragraphs,
};

const BASE_CONFIDENCE: f64 = 0.2;
const SENTENCE_PARAGRAPH_BOOST: f64 = 0.05;
const MIN_SENTENCE_PARAGRAPH_CHARS: usize = 40;

struct ReplyPattern {
    name: &'static str,
    regex: Regex,
    boost: f64,
}

pub struct DelimiterExtractor {
    rules: CategoryRules,
    patterns: Vec<ReplyPattern>,
    leading_marker: Regex,
    blank_runs: Regex,
}

impl Default for DelimiterExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DelimiterExtractor {
    pub fn new() -> Self {
        let patterns = vec![
            ReplyPattern {
                name: "fenced block",
                regex: Regex::new(r"(?is)```(?:reply|text|markdown)[ \t]*\r?\n(.*?)```").unwrap(),
                boost: 0.35,
            },
            ReplyPattern {
                name: "[REPLY] tags",
                regex: Regex::new(r"(?is)\[REPLY\](.*?)\[/REPLY\]").unwrap(),
                boost: 0.4,
            },
            ReplyPattern {
                name: "<reply> tags",
                regex: Regex::new(r"(?is)<reply>(.*?)</reply>").unwrap(),
                boost: 0.4,
            },
            ReplyPattern {
                name: "labeled line",
                regex: Regex::new(
                    r"(?is)\b(?:proposed|customer|final|suggested)\s+reply\s*\**\s*:\s*\**\s*(.+?)(?:\r?\n[ \t]*\r?\n|\z)",
                )
                .unwrap(),
                boost: 0.25,
            },
            ReplyPattern {
                name: "start/end markers",
                regex: Regex::new(r"(?is)reply\s+start\s*:?(.*?)reply\s+end").unwrap(),
                boost: 0.3,
            },
        ];

        Self {
            rules: CategoryRules::new(),
            patterns,
            leading_marker: Regex::new(r"(?m)^[ \t]*(?:>+|[-*•]|\d+[.)])[ \t]+").unwrap(),
            blank_runs: Regex::new(r"\n{3,}").unwrap(),
        }
    }

    pub fn extract(&self, text: &str) -> ExtractionResult {
        let mut confidence = BASE_CONFIDENCE;
        let mut errors = Vec::new();

        let inferred = self.rules.infer(text);
        inferred.score(&mut confidence, &mut errors);

        let matched = self.patterns.iter().find_map(|pattern| {
            pattern
                .regex
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| self.clean(m.as_str()))
                .filter(|reply| !reply.is_empty())
                .map(|reply| (pattern, reply))
        });

        let reply = if let Some((pattern, reply)) = matched {
            tracing::debug!(pattern = pattern.name, "Reply delimiter matched");
            confidence += pattern.boost;
            Some(reply)
        } else if let Some(paragraph) = sentence_paragraph(text) {
            confidence += SENTENCE_PARAGRAPH_BOOST;
            errors.push("no reply delimiters found, used best complete paragraph".to_string());
            Some(self.clean(paragraph))
        } else if !text.trim().is_empty() {
            errors.push("no reply delimiters found, used entire response".to_string());
            confidence = CONFIDENCE_FLOOR;
            Some(self.clean(text))
        } else {
            errors.push("response was empty".to_string());
            confidence = CONFIDENCE_FLOOR;
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
            method: ExtractionMethod::DelimiterScan,
        }
    }

    /// Strip surrounding quotes and list/quote markers, and squeeze blank runs
    fn clean(&self, raw: &str) -> String {
        let unmarked = self.leading_marker.replace_all(raw.trim(), "");
        let squeezed = self.blank_runs.replace_all(&unmarked, "\n\n");
        squeezed
            .trim()
            .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'))
            .trim()
            .to_string()
    }
}

/// Longest paragraph that reads like finished prose
fn sentence_paragraph(text: &str) -> Option<&str> {
    paragraphs(text)
        .into_iter()
        .filter(|p| {
            p.chars().count() >= MIN_SENTENCE_PARAGRAPH_CHARS
                && p.trim_end_matches(['"', '\'', ')'])
                    .ends_with(['.', '!', '?'])
        })
        .fold(None, |best: Option<&str>, p| match best {
            Some(b) if b.chars().count() >= p.chars().count() => Some(b),
            _ => Some(p),
        })
}
