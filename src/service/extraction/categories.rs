//! Category inference shared by both extraction strategies

use regex::Regex;

use crate::model::{Department, Priority, Sentiment};

/// Confidence added for each category decided by a keyword
pub const MATCH_BOOST: f64 = 0.15;

/// Confidence removed for each category that fell back to its default
pub const DEFAULT_PENALTY: f64 = 0.05;

/// A category value and whether a keyword decided it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inferred<T> {
    pub value: T,
    pub matched: bool,
}

impl<T> Inferred<T> {
    fn matched(value: T) -> Self {
        Self {
            value,
            matched: true,
        }
    }

    fn defaulted(value: T) -> Self {
        Self {
            value,
            matched: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredCategories {
    pub sentiment: Inferred<Sentiment>,
    pub department: Inferred<Department>,
    pub priority: Inferred<Priority>,
}

impl InferredCategories {
    /// Apply the keyword score to `confidence` and log a defect for every
    /// defaulted category.
    pub fn score(&self, confidence: &mut f64, errors: &mut Vec<String>) {
        let checks = [
            (self.sentiment.matched, "sentiment unclear, defaulted to neutral"),
            (
                self.department.matched,
                "department unclear, defaulted to customer_support",
            ),
            (self.priority.matched, "priority unclear, defaulted to medium"),
        ];

        for (matched, defect) in checks {
            if matched {
                *confidence += MATCH_BOOST;
            } else {
                *confidence -= DEFAULT_PENALTY;
                errors.push(defect.to_string());
            }
        }
    }
}

/// Case-insensitive whole-word vocabulary rules
pub struct CategoryRules {
    negative: Regex,
    positive: Regex,
    ordering: Regex,
    shipping: Regex,
    quality: Regex,
    urgent: Regex,
    relaxed: Regex,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryRules {
    pub fn new() -> Self {
        Self {
            negative: Regex::new(
                r"(?i)\b(sorry|apolog\w*|unfortunately|disappoint\w*|frustrat\w*|upset|angry|terrible|awful|horrible|unacceptable|complain\w*|inconvenien\w*|worst)\b",
            )
            .unwrap(),
            positive: Regex::new(
                r"(?i)\b(thank\w*|great|excellent|amazing|wonderful|fantastic|appreciate\w*|glad|happy|pleased|love)\b",
            )
            .unwrap(),
            ordering: Regex::new(r"(?i)\b(order\w*|purchas\w*|checkout|cart|refund\w*)\b").unwrap(),
            shipping: Regex::new(
                r"(?i)\b(ship\w*|deliver\w*|track\w*|courier|parcel|arriv\w*)\b",
            )
            .unwrap(),
            quality: Regex::new(
                r"(?i)\b(defect\w*|quality|broken|faulty|damaged|malfunction\w*)\b",
            )
            .unwrap(),
            urgent: Regex::new(r"(?i)\b(urgent\w*|immediate\w*|today|asap|emergency)\b").unwrap(),
            relaxed: Regex::new(r"(?i)(\bno rush\b|\bwhenever\b|\bno hurry\b)").unwrap(),
        }
    }

    /// Infer sentiment, department and priority from `text`.
    ///
    /// Precedence: negative before positive; ordering, then shipping, then
    /// quality; high before low.
    pub fn infer(&self, text: &str) -> InferredCategories {
        let sentiment = if self.negative.is_match(text) {
            Inferred::matched(Sentiment::Negative)
        } else if self.positive.is_match(text) {
            Inferred::matched(Sentiment::Positive)
        } else {
            Inferred::defaulted(Sentiment::Neutral)
        };

        let department = if self.ordering.is_match(text) {
            Inferred::matched(Department::OnlineOrdering)
        } else if self.shipping.is_match(text) {
            Inferred::matched(Department::ShippingAndDelivery)
        } else if self.quality.is_match(text) {
            Inferred::matched(Department::ProductQuality)
        } else {
            Inferred::defaulted(Department::CustomerSupport)
        };

        let priority = if self.urgent.is_match(text) {
            Inferred::matched(Priority::High)
        } else if self.relaxed.is_match(text) {
            Inferred::matched(Priority::Low)
        } else {
            Inferred::defaulted(Priority::Medium)
        };

        InferredCategories {
            sentiment,
            department,
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_shipping_default_priority() {
        let inferred =
            CategoryRules::new().infer("Great service! The delivery was super fast this time.");
        assert_eq!(inferred.sentiment, Inferred::matched(Sentiment::Positive));
        assert_eq!(
            inferred.department,
            Inferred::matched(Department::ShippingAndDelivery)
        );
        assert_eq!(inferred.priority, Inferred::defaulted(Priority::Medium));
    }

    #[test]
    fn test_precedence() {
        let rules = CategoryRules::new();
        let inferred =
            rules.infer("Thanks, but I'm sorry to say my ORDER was shipped broken. Need it today!");
        assert_eq!(inferred.sentiment.value, Sentiment::Negative);
        assert_eq!(inferred.department.value, Department::OnlineOrdering);
        assert_eq!(inferred.priority.value, Priority::High);

        let inferred = rules.infer("The blender arrived faulty. No rush on a replacement.");
        assert_eq!(inferred.department.value, Department::ShippingAndDelivery);
        assert_eq!(inferred.priority.value, Priority::Low);
    }

    #[test]
    fn test_whole_words_only() {
        let inferred = CategoryRules::new().infer("The borderline case of a hardship");
        assert!(!inferred.department.matched);
        assert_eq!(inferred.department.value, Department::CustomerSupport);
    }

    #[test]
    fn test_score_adjusts_confidence_and_errors() {
        let inferred = CategoryRules::new().infer("Hello there");
        let mut confidence = 0.2;
        let mut errors = Vec::new();
        inferred.score(&mut confidence, &mut errors);

        assert!((confidence - 0.05).abs() < 1e-9);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("sentiment unclear"));
    }
}
