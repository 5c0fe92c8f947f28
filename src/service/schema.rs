//! Support-ticket schema definition
//!
//! The JSON schema derived from [`SupportTicket`] is the single source of truth
//! for both directions of the contract:
//! - the runtime validator walks the derived document to check candidate values
//! - the generation constraint sent to the provider is the same document
//!
//! A change to a field constraint on the Rust type therefore changes validation
//! and generation together.

use std::fmt;
use std::sync::LazyLock;

use schemars::generate::SchemaSettings;
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::model::SupportTicket;

/// Name under which the schema is bound in provider requests
pub const SCHEMA_NAME: &str = "support_ticket";

/// Keywords stripped from the provider copy of the schema. The runtime
/// validator still enforces `minLength`.
const PROVIDER_STRIPPED_KEYWORDS: &[&str] = &["$schema", "title", "format", "minLength"];

static TICKET_SCHEMA: LazyLock<TicketSchema> = LazyLock::new(TicketSchema::new);

/// Constraint code attached to each validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    InvalidType,
    InvalidEnumValue,
    TooSmall,
    TooBig,
    MissingField,
    UnrecognizedKey,
}

/// A single field-level validation problem
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ValidationIssue {
    /// Dotted path of the offending field (empty for the root value)
    pub path: String,
    pub message: String,
    pub code: IssueCode,
}

/// Parsed JSON that does not satisfy the ticket schema
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ValidationFailure {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self
            .issues
            .iter()
            .map(|i| {
                if i.path.is_empty() {
                    i.message.clone()
                } else {
                    format!("{}: {}", i.path, i.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "schema validation failed: {}", summary)
    }
}

/// JSON-Schema document exported for generation constraints
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    pub name: &'static str,
    pub schema: Value,
}

impl SchemaDocument {
    /// Copy of the schema without annotations the provider's strict mode rejects
    pub fn provider_schema(&self) -> Value {
        let mut schema = self.schema.clone();
        strip_keywords(&mut schema);
        schema
    }
}

/// Derived schema for [`SupportTicket`] plus the validator that walks it
#[derive(Debug, Clone)]
pub struct TicketSchema {
    root: Value,
}

impl TicketSchema {
    /// Derive the schema from the `SupportTicket` type.
    ///
    /// Subschemas are inlined so the document is a bare object schema with no
    /// `$defs` wrapper and no `$ref`.
    pub fn new() -> Self {
        let generator = SchemaSettings::draft07()
            .with(|s| s.inline_subschemas = true)
            .into_generator();
        let schema = generator.into_root_schema_for::<SupportTicket>();
        let root = serde_json::to_value(&schema).unwrap_or(Value::Null);

        Self { root }
    }

    /// Process-wide instance
    pub fn shared() -> &'static TicketSchema {
        &TICKET_SCHEMA
    }

    pub fn to_json_schema(&self) -> SchemaDocument {
        SchemaDocument {
            name: SCHEMA_NAME,
            schema: self.root.clone(),
        }
    }

    /// Validate an untyped candidate in strict mode.
    ///
    /// Every issue found is reported, each referencing the field and the
    /// violated constraint. Unknown fields are rejected.
    pub fn validate(&self, candidate: &Value) -> Result<SupportTicket, ValidationFailure> {
        let mut issues = Vec::new();
        check_value(&self.root, candidate, "", &mut issues);

        if !issues.is_empty() {
            return Err(ValidationFailure { issues });
        }

        serde_json::from_value(candidate.clone()).map_err(|e| ValidationFailure {
            issues: vec![ValidationIssue {
                path: String::new(),
                message: e.to_string(),
                code: IssueCode::InvalidType,
            }],
        })
    }
}

impl Default for TicketSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate against the shared ticket schema
pub fn validate(candidate: &Value) -> Result<SupportTicket, ValidationFailure> {
    TicketSchema::shared().validate(candidate)
}

/// Export the shared ticket schema
pub fn to_json_schema() -> SchemaDocument {
    TicketSchema::shared().to_json_schema()
}

fn strip_keywords(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            for keyword in PROVIDER_STRIPPED_KEYWORDS {
                map.remove(*keyword);
            }
            if let Some(Value::Object(properties)) = map.get_mut("properties") {
                for property in properties.values_mut() {
                    strip_keywords(property);
                }
            }
            if let Some(items) = map.get_mut("items") {
                strip_keywords(items);
            }
        }
        Value::Array(values) => values.iter_mut().for_each(strip_keywords),
        _ => {}
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|n| n.fract() == 0.0)
        }
        _ => true,
    }
}

fn check_value(schema: &Value, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    let allowed_types: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    if !allowed_types.is_empty() && !allowed_types.iter().any(|t| matches_type(t, value)) {
        issues.push(ValidationIssue {
            path: path.to_string(),
            message: format!(
                "expected {}, received {}",
                allowed_types.join(" or "),
                type_name(value)
            ),
            code: IssueCode::InvalidType,
        });
        return;
    }

    if let Some(Value::Array(options)) = schema.get("enum")
        && !options.contains(value)
    {
        let expected = options
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        issues.push(ValidationIssue {
            path: path.to_string(),
            message: format!("invalid enum value {}, expected {}", value, expected),
            code: IssueCode::InvalidEnumValue,
        });
        return;
    }

    match value {
        Value::Number(n) => check_number(schema, n.as_f64().unwrap_or(f64::NAN), path, issues),
        Value::String(s) => check_string(schema, s, path, issues),
        Value::Object(fields) => check_object(schema, fields, path, issues),
        _ => {}
    }
}

fn check_number(schema: &Map<String, Value>, n: f64, path: &str, issues: &mut Vec<ValidationIssue>) {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
        && n < min
    {
        issues.push(ValidationIssue {
            path: path.to_string(),
            message: format!("number must be greater than or equal to {}", min),
            code: IssueCode::TooSmall,
        });
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
        && n > max
    {
        issues.push(ValidationIssue {
            path: path.to_string(),
            message: format!("number must be less than or equal to {}", max),
            code: IssueCode::TooBig,
        });
    }
}

fn check_string(schema: &Map<String, Value>, s: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    let len = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
        && len < min
    {
        issues.push(ValidationIssue {
            path: path.to_string(),
            message: format!("string must contain at least {} character(s)", min),
            code: IssueCode::TooSmall,
        });
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
        && len > max
    {
        issues.push(ValidationIssue {
            path: path.to_string(),
            message: format!("string must contain at most {} character(s)", max),
            code: IssueCode::TooBig,
        });
    }
}

fn check_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                issues.push(ValidationIssue {
                    path: join_path(path, name),
                    message: "required field is missing".to_string(),
                    code: IssueCode::MissingField,
                });
            }
        }
    }

    let strict = matches!(schema.get("additionalProperties"), Some(Value::Bool(false)));

    for (key, field) in fields {
        match properties.and_then(|p| p.get(key)) {
            Some(property) => check_value(property, field, &join_path(path, key), issues),
            None if strict => issues.push(ValidationIssue {
                path: join_path(path, key),
                message: format!("unrecognized key '{}'", key),
                code: IssueCode::UnrecognizedKey,
            }),
            None => {}
        }
    }
}
