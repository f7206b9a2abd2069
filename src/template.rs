//! `{{a.b.c}}` placeholder interpolation against a [`Context`] tree.
//!
//! The sub-language is deliberately minimal: a token is a dotted path and
//! nothing else. Unresolved paths render as the empty string, never an error.

use serde_json::Value;

use crate::context::{Context, FieldPath};

/// Replace every `{{path}}` token in `template` with the string form of the
/// context value at `path`. Inputs without tokens are returned unchanged.
pub fn resolve(template: &str, context: &Context) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let path = after[..end].trim();
                if let Some(value) = context.get(&FieldPath::from(path)) {
                    out.push_str(&render_value(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated token: keep the literal text.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Interpolate every string leaf of a JSON value, recursing through objects
/// and arrays. Used for nested action configs such as webhook payloads.
pub fn resolve_value(value: &Value, context: &Context) -> Value {
    match value {
        Value::String(template) => Value::String(resolve(template, context)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), resolve_value(nested, context)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items.iter().map(|item| resolve_value(item, context)).collect(),
        ),
        other => other.clone(),
    }
}

/// Natural textual form of a context value: strings verbatim, numbers and
/// booleans via their display form, null and absent as empty.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Context {
        Context::from_value(json!({
            "task": {"title": "Launch campaign", "estimate": 3, "urgent": true},
            "campaign": {"name": "Spring Sale"}
        }))
    }

    #[test]
    fn interpolates_dotted_paths() {
        let resolved = resolve("Review {{campaign.name}} performance", &context());
        assert_eq!(resolved, "Review Spring Sale performance");
    }

    #[test]
    fn token_free_templates_are_identity() {
        let template = "nothing to see here";
        assert_eq!(resolve(template, &context()), template);
    }

    #[test]
    fn missing_paths_render_empty() {
        assert_eq!(resolve("[{{task.owner.email}}]", &context()), "[]");
    }

    #[test]
    fn numbers_and_booleans_stringify_naturally() {
        let resolved = resolve("{{task.estimate}}d urgent={{task.urgent}}", &context());
        assert_eq!(resolved, "3d urgent=true");
    }

    #[test]
    fn unterminated_token_is_left_verbatim() {
        assert_eq!(resolve("broken {{task.title", &context()), "broken {{task.title");
    }

    #[test]
    fn resolves_nested_object_configs() {
        let payload = json!({
            "text": "{{task.title}} moved",
            "fields": [{"label": "campaign", "value": "{{campaign.name}}"}],
            "retries": 3
        });
        let resolved = resolve_value(&payload, &context());
        assert_eq!(
            resolved,
            json!({
                "text": "Launch campaign moved",
                "fields": [{"label": "campaign", "value": "Spring Sale"}],
                "retries": 3
            })
        );
    }
}
