//! Expression evaluation for step conditions and declared inputs.
//!
//! Templates use the `${{ ... }}` syntax. Supported expression shapes:
//!
//! - `steps.build.outputs.artifact` — dot-path navigation over the context
//! - `left == right` / `left != right` — comparison against quoted literals
//!   (`'...'` or `"..."`) or other paths
//! - bare literals — `true`, `'text'`, numbers
//!
//! The context is an arbitrary JSON value assembled by the caller; missing
//! paths resolve to the empty string rather than failing, so conditions over
//! not-yet-run steps degrade to falsy instead of erroring.

use serde_json::Value;

/// Replaces every `${{ ... }}` template in `input` with its resolved value.
pub fn interpolate(input: &str, context: &Value) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${{") {
        output.push_str(&rest[..start]);
        let after_marker = &rest[start + 3..];
        match after_marker.find("}}") {
            Some(end) => {
                let expression = after_marker[..end].trim();
                output.push_str(&resolve_expression(expression, context));
                rest = &after_marker[end + 2..];
            }
            None => {
                // Unterminated template: keep the remainder verbatim.
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

/// Evaluates a raw expression (without template markers) to a string.
///
/// Step `when` clauses are written without `${{ }}`; this wraps them so they
/// share one resolution path with interpolated inputs.
pub fn evaluate_expression(expression: &str, context: &Value) -> String {
    interpolate(&format!("${{{{ {expression} }}}}"), context)
}

/// Truthiness of an evaluated expression result.
///
/// Falsy values are the empty string and the literals `false`, `0`, `null`,
/// and `undefined`; everything else is truthy.
pub fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "false" | "0" | "null" | "undefined")
}

fn resolve_expression(expression: &str, context: &Value) -> String {
    if let Some(result) = evaluate_comparison(expression, context) {
        return if result { "true".into() } else { "false".into() };
    }
    resolve_operand(expression, context)
}

/// Evaluates `left == right` / `left != right`. Returns `None` when no
/// comparison operator is present.
fn evaluate_comparison(expression: &str, context: &Value) -> Option<bool> {
    let (operator_index, negated) = match (expression.find("=="), expression.find("!=")) {
        (Some(eq), Some(ne)) => {
            if ne < eq {
                (ne, true)
            } else {
                (eq, false)
            }
        }
        (Some(eq), None) => (eq, false),
        (None, Some(ne)) => (ne, true),
        (None, None) => return None,
    };

    let left = resolve_operand(expression[..operator_index].trim(), context);
    let right = resolve_operand(expression[operator_index + 2..].trim(), context);
    Some((left == right) != negated)
}

/// Resolves a single operand: a quoted literal, a bare literal, or a
/// dot-path into the context.
fn resolve_operand(operand: &str, context: &Value) -> String {
    let trimmed = operand.trim();
    for quote in ['\'', '"'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    if matches!(trimmed, "true" | "false" | "null" | "undefined") || trimmed.parse::<f64>().is_ok() {
        return trimmed.to_string();
    }
    format_value(resolve_path(trimmed, context))
}

/// Navigates a dot-separated path over the context value.
fn resolve_path<'a>(path: &str, context: &'a Value) -> Option<&'a Value> {
    let mut current = context;
    for part in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(part)?,
            Value::Array(items) => {
                let index = part.parse::<usize>().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

fn format_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
