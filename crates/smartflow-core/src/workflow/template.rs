//! `{name}` placeholder rendering for prompt and judge templates.
//!
//! `{{` and `}}` render as literal braces, so JSON examples can be embedded in
//! a template. String values are inserted verbatim; any other JSON value is
//! inserted in its compact JSON form.

use serde_json::{Map, Value};
use smartflow_types::error::TemplateError;

/// Render `template`, substituting each `{name}` from `vars`.
pub fn render(template: &str, vars: &Map<String, Value>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    let mut literal_start = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                out.push_str(&template[literal_start..i]);
                if bytes.get(i + 1) == Some(&b'{') {
                    out.push('{');
                    i += 2;
                } else {
                    let close = template[i + 1..]
                        .find('}')
                        .map(|offset| i + 1 + offset)
                        .ok_or(TemplateError::Unterminated(i))?;
                    let name = template[i + 1..close].trim();
                    let value = vars
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingVariable(name.to_string()))?;
                    out.push_str(&value_as_text(value));
                    i = close + 1;
                }
                literal_start = i;
            }
            b'}' => {
                out.push_str(&template[literal_start..i]);
                if bytes.get(i + 1) == Some(&b'}') {
                    out.push('}');
                    i += 2;
                } else {
                    return Err(TemplateError::UnmatchedClose(i));
                }
                literal_start = i;
            }
            _ => i += 1,
        }
    }
    out.push_str(&template[literal_start..]);

    Ok(out)
}

/// Text form of a JSON value as it appears inside a rendered prompt.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
