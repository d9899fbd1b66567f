//! The `NAME=VALUE` exchange-file format and placeholder substitution.
//!
//! Actions report outputs and environment variables back to the runtime by
//! appending `NAME=VALUE` lines to runtime-managed exchange files. The parser
//! here is deliberately forgiving: blank lines, comments, and lines without a
//! `=` are ignored, and values keep everything after the first `=` verbatim.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid placeholder pattern"));

/// Parses exchange-file content into an ordered name → value mapping.
///
/// Later lines overwrite earlier ones for the same name, so an action may
/// append a corrected value without truncating the file.
pub fn parse_variable_file(content: &str) -> IndexMap<String, String> {
    let mut variables = IndexMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        variables.insert(name.to_string(), value.to_string());
    }
    variables
}

/// Resolves `$NAME` / `${NAME}` placeholders in every value of an environment
/// map against the other entries of the same map.
///
/// Unknown placeholders are left untouched so shell-level expansion inside the
/// subprocess still has a chance to resolve them.
pub fn replace_variable_placeholders(variables: &IndexMap<String, String>) -> IndexMap<String, String> {
    variables
        .iter()
        .map(|(name, value)| (name.clone(), replace_in_value(value, variables)))
        .collect()
}

fn replace_in_value(value: &str, variables: &IndexMap<String, String>) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(value, |captures: &regex::Captures| {
            let name = captures
                .get(1)
                .or_else(|| captures.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match variables.get(name) {
                Some(resolved) => resolved.clone(),
                None => captures
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .into_owned()
}
