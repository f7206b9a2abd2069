use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metrics::MetricSnapshot;

/// Dotted field path used to address values inside a [`Context`] tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|segment| !segment.is_empty())
    }

    pub(crate) fn locate<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in self.segments() {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(value) => current = value,
                    None => return None,
                },
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    current = items.get(index)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath::new(value)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        FieldPath::new(value)
    }
}

/// Raw payload describing the event that fired a trigger: the entity after
/// the change, its previous state, the acting user and an optional metric
/// snapshot for threshold triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Kind of the affected entity ("task", "campaign", "ad", ...). Used as
    /// the top-level context key so conditions can say `task.title`.
    pub entity_kind: String,
    /// Entity state after the change.
    pub entity: Value,
    /// Entity state before the change, when the trigger implies one.
    #[serde(default)]
    pub previous: Option<Value>,
    /// User that caused the change.
    #[serde(default)]
    pub actor: Option<Value>,
    /// Metric snapshot for threshold triggers.
    #[serde(default)]
    pub metrics: Option<MetricSnapshot>,
    /// Remaining hours until the entity's due date, for due-date triggers.
    #[serde(default)]
    pub hours_until_due: Option<f64>,
    /// Schedule label supplied by the external scheduler on timed ticks.
    #[serde(default)]
    pub schedule: Option<String>,
}

impl TriggerEvent {
    pub fn new(entity_kind: impl Into<String>, entity: Value) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            entity,
            previous: None,
            actor: None,
            metrics: None,
            hours_until_due: None,
            schedule: None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.entity.get("status").and_then(Value::as_str)
    }

    pub fn previous_status(&self) -> Option<&str> {
        self.previous
            .as_ref()
            .and_then(|prev| prev.get("status"))
            .and_then(Value::as_str)
    }
}

/// Immutable key-value tree built from a [`TriggerEvent`], consumed by
/// condition evaluation and template interpolation. Every lookup either
/// resolves to a concrete value or reports the path as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    root: Value,
}

impl Context {
    /// Assemble the context tree for an event. The entity is exposed twice:
    /// under its declared kind and under the fixed key `entity`, so handlers
    /// can address it without knowing the kind.
    pub fn from_event(event: &TriggerEvent) -> Self {
        let mut root = serde_json::Map::new();
        root.insert(event.entity_kind.clone(), event.entity.clone());
        root.insert("entity".to_string(), event.entity.clone());
        if let Some(previous) = &event.previous {
            root.insert("previous".to_string(), previous.clone());
        }
        if let Some(actor) = &event.actor {
            root.insert("actor".to_string(), actor.clone());
        }
        if let Some(metrics) = &event.metrics {
            root.insert(
                "metrics".to_string(),
                serde_json::to_value(metrics).unwrap_or(Value::Null),
            );
        }
        Self {
            root: Value::Object(root),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.locate(&self.root)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_fields() {
        let path = FieldPath::from("task.assignee.name");
        let context = Context::from_value(json!({
            "task": {"assignee": {"name": "Ada"}}
        }));

        assert_eq!(
            context.get(&path).and_then(Value::as_str),
            Some("Ada")
        );
    }

    #[test]
    fn missing_paths_are_absent_not_null() {
        let context = Context::from_value(json!({"task": {"title": "demo"}}));
        assert!(context.get(&"task.owner.id".into()).is_none());
        assert!(context.get(&"campaign".into()).is_none());
    }

    #[test]
    fn event_exposes_entity_under_kind_and_fixed_key() {
        let event = TriggerEvent {
            actor: Some(json!({"id": "user-1"})),
            ..TriggerEvent::new("task", json!({"id": "t-1", "title": "launch"}))
        };
        let context = Context::from_event(&event);

        assert_eq!(
            context.get(&"task.title".into()).and_then(Value::as_str),
            Some("launch")
        );
        assert_eq!(
            context.get(&"entity.id".into()).and_then(Value::as_str),
            Some("t-1")
        );
        assert_eq!(
            context.get(&"actor.id".into()).and_then(Value::as_str),
            Some("user-1")
        );
    }

    #[test]
    fn metric_snapshot_is_reachable_through_context() {
        let mut event = TriggerEvent::new("ad", json!({"id": "ad-1"}));
        event.metrics = Some(MetricSnapshot {
            roas: 3.0,
            ..MetricSnapshot::default()
        });
        let context = Context::from_event(&event);

        assert_eq!(
            context.get(&"metrics.roas".into()).and_then(Value::as_f64),
            Some(3.0)
        );
    }
}
