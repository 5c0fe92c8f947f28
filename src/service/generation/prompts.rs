//! Prompts for ticket generation

/// System prompt for response-format generation
pub const CLASSIFICATION_SYSTEM_PROMPT: &str = r#"You are a customer service assistant that triages incoming customer messages.

For each message:
- Classify the overall sentiment (positive, neutral or negative).
- Route it to exactly one department: customer_support, online_ordering, product_quality, shipping_and_delivery or other_off_topic.
- Assess priority (low, medium or high) from the urgency the customer expresses.
- Draft a polite, helpful reply addressed to the customer.
- Report your confidence in the classification as a number between 0 and 1."#;

/// System prompt for the forced tool call
pub const TOOL_SYSTEM_PROMPT: &str =
    "Classify the customer message and propose a reply by calling the provided function.";

/// Description attached to the classification tool
pub const TOOL_DESCRIPTION: &str = "Classify a support message and propose a reply.";

/// System prompt for unconstrained generation
pub const FREE_TEXT_SYSTEM_PROMPT: &str = "Be helpful and concise. A customer has come to you with a problem we need to respond to. Write the response to their message.";

pub fn build_classification_prompt(message: &str) -> String {
    format!("Customer message: {}", message)
}

/// Free-text prompt asking for the ticket fields without enforcing a format
pub fn build_free_text_prompt(message: &str) -> String {
    format!(
        "Analyze this customer message and suggest sentiment, department, priority and a reply:\n{}",
        message
    )
}
