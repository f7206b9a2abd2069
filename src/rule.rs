use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::condition::Condition;
use crate::error::EngineError;
use crate::trigger::TriggerSpec;

/// Declarative automation rule: a trigger, an ANDed condition list and the
/// actions to run when both match. Owned by its author; the engine only
/// reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Unique identifier. Left blank, the store generates one.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: TriggerSpec,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default = "Rule::default_enabled")]
    pub enabled: bool,
    /// Project or campaign the rule is confined to.
    #[serde(default)]
    pub scope_id: Option<String>,
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u64,
}

impl Rule {
    pub fn default_enabled() -> bool {
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Structural validation applied at the store boundary. Records failing
    /// here are quarantined, never dispatched.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid_rule(&self.id, "rule name is empty"));
        }
        if self.actions.is_empty() {
            return Err(EngineError::invalid_rule(
                &self.id,
                "rule declares no actions",
            ));
        }
        for action in &self.actions {
            action.validate(&self.id)?;
        }
        Ok(())
    }
}
