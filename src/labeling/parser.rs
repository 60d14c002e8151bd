//! Classifier response parsing and validation.
//!
//! Raw text → JSON array → validated `LabelResult`s keyed by their 1-based
//! position in the batch. `match_results` is the only place results are tied
//! back to items.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::error::LabelingError;
use super::types::LabelResult;
use crate::models::Item;

/// Longest reasoning kept per item, in characters.
pub const MAX_REASONING_CHARS: usize = 500;

/// Parse one batch's raw reply.
///
/// Fails with `Parse` when the text is not a JSON array, with `Validation`
/// when any element is malformed. Out-of-range and repeated indices are
/// dropped with a warning rather than failing the batch.
pub fn parse_response(raw: &str, batch_len: usize) -> Result<Vec<LabelResult>, LabelingError> {
    let cleaned = strip_code_fences(raw);

    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| LabelingError::Parse(format!("invalid JSON: {e}")))?;

    let Value::Array(elements) = value else {
        return Err(LabelingError::Parse("response is not a JSON array".into()));
    };

    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(elements.len());

    for (position, element) in elements.iter().enumerate() {
        let result = validate_element(position, element)?;

        if result.ordinal > batch_len {
            tracing::warn!(
                index = result.ordinal,
                batch_len,
                "Result index exceeds batch size, dropping"
            );
            continue;
        }
        if !seen.insert(result.ordinal) {
            tracing::warn!(index = result.ordinal, "Duplicate result index, keeping first");
            continue;
        }
        results.push(result);
    }

    results.sort_by_key(|r| r.ordinal);
    Ok(results)
}

/// Pair each result with the item at position `ordinal - 1`.
pub fn match_results<'a>(
    items: &'a [Item],
    results: &'a [LabelResult],
) -> Vec<(&'a Item, &'a LabelResult)> {
    results
        .iter()
        .filter_map(|result| {
            result
                .ordinal
                .checked_sub(1)
                .and_then(|idx| items.get(idx))
                .map(|item| (item, result))
        })
        .collect()
}

/// Clamp a confidence into [0, 1].
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}

/// Remove surrounding ```json / ``` fences.
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the fence line, including an optional language tag.
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    text = text.trim();
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

fn validate_element(position: usize, element: &Value) -> Result<LabelResult, LabelingError> {
    let Value::Object(fields) = element else {
        return Err(LabelingError::Validation(format!(
            "element {position} is not an object"
        )));
    };

    let ordinal = positive_index(fields).ok_or_else(|| {
        LabelingError::Validation(format!(
            "element {position} has no positive integer index"
        ))
    })?;

    let label = fields
        .get("label")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            LabelingError::Validation(format!("element {position} has no label"))
        })?;

    let confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            LabelingError::Validation(format!(
                "element {position} has a missing or non-numeric confidence"
            ))
        })?;

    let reasoning = fields
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(truncate_reasoning);

    Ok(LabelResult {
        ordinal,
        label: label.to_string(),
        confidence: clamp_confidence(confidence),
        reasoning,
    })
}

fn positive_index(fields: &Map<String, Value>) -> Option<usize> {
    let index = fields.get("index")?;
    let value = match index.as_u64() {
        Some(n) => n,
        None => {
            let f = index.as_f64()?;
            if f.fract() != 0.0 || f < 1.0 {
                return None;
            }
            f as u64
        }
    };
    if value == 0 {
        return None;
    }
    usize::try_from(value).ok()
}

fn truncate_reasoning(reasoning: &str) -> String {
    match reasoning.char_indices().nth(MAX_REASONING_CHARS) {
        Some((byte_idx, _)) => reasoning[..byte_idx].to_string(),
        None => reasoning.to_string(),
    }
}
