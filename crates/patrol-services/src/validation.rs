//! Request shape checks, run before any id is decoded.
//!
//! Each check returns field-level violations instead of failing on the
//! first problem, so a caller sees everything wrong with a body at once.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Content must be non-blank and at most `max_chars` characters.
pub fn validate_content(content: &str, max_chars: usize) -> Option<Violation> {
    if content.trim().is_empty() {
        return Some(Violation::new("content", "must not be blank"));
    }
    let len = content.chars().count();
    if len > max_chars {
        return Some(Violation::new(
            "content",
            format!("must be at most {max_chars} characters (got {len})"),
        ));
    }
    None
}

fn require_token(body: &Value, field: &str, violations: &mut Vec<Violation>) -> String {
    match body.get(field) {
        None | Some(Value::Null) => {
            violations.push(Violation::new(field, "is required"));
            String::new()
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            violations.push(Violation::new(field, "must not be blank"));
            String::new()
        }
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            violations.push(Violation::new(field, "must be a string"));
            String::new()
        }
    }
}

fn require_content(body: &Value, max_chars: usize, violations: &mut Vec<Violation>) -> String {
    match body.get("content") {
        None | Some(Value::Null) => {
            violations.push(Violation::new("content", "is required"));
            String::new()
        }
        Some(Value::String(s)) => {
            if let Some(v) = validate_content(s, max_chars) {
                violations.push(v);
            }
            s.clone()
        }
        Some(_) => {
            violations.push(Violation::new("content", "must be a string"));
            String::new()
        }
    }
}

fn require_object(body: &Value) -> Result<(), Vec<Violation>> {
    if body.is_object() {
        Ok(())
    } else {
        Err(vec![Violation::new("body", "must be a JSON object")])
    }
}

// ── Multi-recipient send ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSendRequest {
    pub sender_id: String,
    pub receiver_ids: Vec<String>,
    pub order_id: String,
    pub content: String,
}

impl MultiSendRequest {
    /// Validate a raw JSON body. Receiver tokens are only checked for being
    /// strings; decoding them is per-receiver work for the dispatcher.
    pub fn from_json(body: &Value, max_chars: usize) -> Result<Self, Vec<Violation>> {
        require_object(body)?;
        let mut violations = Vec::new();

        let sender_id = require_token(body, "sender_id", &mut violations);
        let order_id = require_token(body, "order_id", &mut violations);

        let mut receiver_ids = Vec::new();
        match body.get("receiver_ids") {
            None | Some(Value::Null) => {
                violations.push(Violation::new("receiver_ids", "is required"))
            }
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => receiver_ids.push(s.clone()),
                        _ => violations.push(Violation::new(
                            format!("receiver_ids[{i}]"),
                            "must be a string",
                        )),
                    }
                }
            }
            Some(_) => violations.push(Violation::new("receiver_ids", "must be a list")),
        }

        let content = require_content(body, max_chars, &mut violations);

        if violations.is_empty() {
            Ok(Self {
                sender_id,
                receiver_ids,
                order_id,
                content,
            })
        } else {
            Err(violations)
        }
    }
}

// ── Single send ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleSendRequest {
    pub sender_id: String,
    pub receiver_id: String,
    pub order_id: String,
    pub content: String,
}

impl SingleSendRequest {
    pub fn from_json(body: &Value, max_chars: usize) -> Result<Self, Vec<Violation>> {
        require_object(body)?;
        let mut violations = Vec::new();

        let sender_id = require_token(body, "sender_id", &mut violations);
        let receiver_id = require_token(body, "receiver_id", &mut violations);
        let order_id = require_token(body, "order_id", &mut violations);
        let content = require_content(body, max_chars, &mut violations);

        if violations.is_empty() {
            Ok(Self {
                sender_id,
                receiver_id,
                order_id,
                content,
            })
        } else {
            Err(violations)
        }
    }
}
