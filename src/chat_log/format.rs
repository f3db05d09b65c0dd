use serde_json::Value;

use super::{ContentUnit, OutcomeBody};

/// Render one content unit for display.
///
/// Returns `None` for content that must never be shown (reasoning). Unknown
/// units render as their raw form rather than disappearing. The output depends
/// only on the input, so identical units always produce identical text.
pub fn format_unit(unit: &ContentUnit) -> Option<String> {
    match unit {
        ContentUnit::Text(text) => Some(text.clone()),
        ContentUnit::ToolInvocation { name, input } => {
            let rendered =
                serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
            Some(format!("**Tool: {name}**\n```json\n{rendered}\n```"))
        }
        ContentUnit::ToolOutcome { body, is_error } => {
            let status = if *is_error { "Error" } else { "Result" };
            Some(format!("**Tool {status}**\n```\n{}\n```", outcome_text(body)))
        }
        ContentUnit::Reasoning(_) => None,
        ContentUnit::Raw(value) => Some(raw_text(value)),
    }
}

/// Collapse a tool result body into one string. Only text sub-units of a list
/// body contribute.
fn outcome_text(body: &OutcomeBody) -> String {
    match body {
        OutcomeBody::Text(text) => text.clone(),
        OutcomeBody::Units(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                    obj.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        OutcomeBody::Other(Value::Null) => String::new(),
        OutcomeBody::Other(value) => value.to_string(),
    }
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
