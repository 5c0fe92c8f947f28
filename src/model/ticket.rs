//! Canonical support-ticket model
//!
//! `SupportTicket` is the single declarative source of the triage shape: the
//! JSON schema handed to the LLM and the runtime validator are both derived
//! from it (see `service::schema`).

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A validated triage record produced by a schema-constrained completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SupportTicket {
    /// Overall sentiment of the customer message
    pub sentiment: Sentiment,

    /// Department the message should be routed to
    pub department: Department,

    /// Polite, helpful reply to send to the customer
    #[schemars(length(min = 1))]
    pub reply: String,

    /// Certainty of the classification, between 0 and 1
    #[schemars(range(min = 0.0, max = 1.0))]
    #[schema(minimum = 0.0, maximum = 1.0)]
    pub confidence: f64,

    /// Urgency of the request
    pub priority: Priority,
}

/// Customer sentiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

/// Routing bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    CustomerSupport,
    OnlineOrdering,
    ProductQuality,
    ShippingAndDelivery,
    OtherOffTopic,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::CustomerSupport => "customer_support",
            Department::OnlineOrdering => "online_ordering",
            Department::ProductQuality => "product_quality",
            Department::ShippingAndDelivery => "shipping_and_delivery",
            Department::OtherOffTopic => "other_off_topic",
        }
    }
}

/// Urgency level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
