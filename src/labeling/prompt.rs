//! Prompt construction for one batch.
//!
//! Items are emitted as a 1-indexed numbered list; that position is the only
//! link from a classifier result back to its item.

use serde_json::Value;

use crate::models::Item;

/// System message sent with every classification call.
pub const SYSTEM_PROMPT: &str =
    "You are a data labeling assistant. Always respond with valid JSON only.";

/// Payload fields checked, in order, for the text to classify.
const TEXT_FIELDS: &[&str] = &[
    "text",
    "content",
    "review",
    "comment",
    "description",
    "message",
    "body",
];

/// Render instructions, numbered items and the required reply format.
pub fn build_prompt(instructions: &str, items: &[Item]) -> String {
    let items_text = items
        .iter()
        .enumerate()
        .map(|(idx, item)| format!("{}. \"{}\"", idx + 1, extract_text(&item.payload)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{instructions}

Label the following items according to the schema above.

Items:
{items_text}

Respond ONLY with a JSON array in this exact format:
[
  {{"index": 1, "label": "category_name", "confidence": 0.95, "reasoning": "brief explanation"}},
  {{"index": 2, "label": "category_name", "confidence": 0.88, "reasoning": "brief explanation"}}
]

Rules:
- confidence must be between 0 and 1
- reasoning should be brief (max 100 characters)
- label must match one of the categories in the schema"#,
        instructions = instructions.trim(),
    )
}

/// Pick the text of a record to show the classifier, collapsed to one line.
pub fn extract_text(payload: &Value) -> String {
    single_line(&raw_text(payload))
}

fn raw_text(payload: &Value) -> String {
    let Value::Object(map) = payload else {
        return match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };

    for field in TEXT_FIELDS {
        match map.get(*field) {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            Some(Value::Bool(true)) => return "true".to_string(),
            _ => {}
        }
    }

    map.values()
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| payload.to_string())
}

fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
