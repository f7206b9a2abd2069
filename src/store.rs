use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::rule::Rule;

/// Versioned entry for a stored rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRule {
    pub version: u32,
    pub rule: Rule,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl StoredRule {
    fn new(version: u32, rule: Rule, updated_by: Option<String>) -> Self {
        Self {
            version,
            rule,
            created_at: Utc::now(),
            updated_by,
        }
    }
}

/// Malformed rule record quarantined at the store boundary instead of being
/// allowed to crash dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetter {
    pub raw: Value,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

#[derive(Default)]
struct ScopeRules {
    rules: HashMap<String, Vec<StoredRule>>,
    dead_letter: Vec<DeadLetter>,
}

/// In-memory rule store partitioned by scope (project or campaign), with
/// per-rule version history and a dead-letter list for records that fail the
/// validating deserializer.
#[derive(Default, Clone)]
pub struct RuleStore {
    inner: Arc<RwLock<HashMap<String, ScopeRules>>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Latest version of every rule in the scope.
    pub fn list_rules(&self, scope: &str) -> Vec<StoredRule> {
        let inner = self.inner.read();
        inner
            .get(scope)
            .map(|rules| {
                rules
                    .rules
                    .values()
                    .filter_map(|versions| versions.last().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rule_history(&self, scope: &str, rule_id: &str) -> Vec<StoredRule> {
        let inner = self.inner.read();
        inner
            .get(scope)
            .and_then(|rules| rules.rules.get(rule_id).cloned())
            .unwrap_or_default()
    }

    pub fn latest_rule(&self, scope: &str, rule_id: &str) -> Option<StoredRule> {
        let inner = self.inner.read();
        inner
            .get(scope)
            .and_then(|rules| rules.rules.get(rule_id))
            .and_then(|versions| versions.last().cloned())
    }

    pub fn dead_letters(&self, scope: &str) -> Vec<DeadLetter> {
        let inner = self.inner.read();
        inner
            .get(scope)
            .map(|rules| rules.dead_letter.clone())
            .unwrap_or_default()
    }

    /// Validate and insert or update a rule, returning the new version.
    /// A blank id gets a generated one.
    pub fn put_rule(
        &self,
        scope: &str,
        mut rule: Rule,
        updated_by: Option<String>,
    ) -> Result<StoredRule> {
        if rule.id.trim().is_empty() {
            rule.id = format!("rule-{}", Uuid::new_v4());
        }
        rule.validate()?;

        let mut inner = self.inner.write();
        let scope_rules = inner.entry(scope.to_string()).or_default();
        let entry = scope_rules.rules.entry(rule.id.clone()).or_default();
        let version = entry.last().map(|last| last.version + 1).unwrap_or(1);
        let stored = StoredRule::new(version, rule, updated_by);
        entry.push(stored.clone());
        Ok(stored)
    }

    /// Validating ingestion boundary for raw rule records (JSON blobs from
    /// the persistence layer or rule files). Malformed records land in the
    /// scope's dead-letter list instead of erroring.
    pub fn ingest(&self, scope: &str, raw: Value, updated_by: Option<String>) -> Option<StoredRule> {
        let parsed = match serde_json::from_value::<Rule>(raw.clone()) {
            Ok(rule) => self.put_rule(scope, rule, updated_by),
            Err(err) => Err(EngineError::Parse {
                path: scope.to_string(),
                message: err.to_string(),
            }),
        };
        match parsed {
            Ok(stored) => Some(stored),
            Err(err) => {
                warn!(scope, error = %err, "quarantined malformed rule");
                self.quarantine(scope, raw, err.to_string());
                None
            }
        }
    }

    pub(crate) fn quarantine(&self, scope: &str, raw: Value, reason: String) {
        let mut inner = self.inner.write();
        inner
            .entry(scope.to_string())
            .or_default()
            .dead_letter
            .push(DeadLetter {
                raw,
                reason,
                quarantined_at: Utc::now(),
            });
    }

    /// Disable a rule by appending a new version with `enabled = false`.
    pub fn disable_rule(
        &self,
        scope: &str,
        rule_id: &str,
        updated_by: Option<String>,
    ) -> Result<StoredRule> {
        let mut inner = self.inner.write();
        let history = inner
            .get_mut(scope)
            .and_then(|rules| rules.rules.get_mut(rule_id))
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))?;
        let latest = history
            .last()
            .cloned()
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))?;

        if !latest.rule.enabled {
            return Ok(latest);
        }

        let mut disabled = latest.rule.clone();
        disabled.enabled = false;
        let stored = StoredRule::new(latest.version + 1, disabled, updated_by);
        history.push(stored.clone());
        Ok(stored)
    }

    /// Latest enabled rules for the scope, re-read on every dispatch call.
    pub fn enabled_rules(&self, scope: &str) -> Vec<Rule> {
        self.list_rules(scope)
            .into_iter()
            .filter(|entry| entry.rule.enabled)
            .map(|entry| entry.rule)
            .collect()
    }

    /// Load a rules file or directory into a scope. Records quarantined by
    /// the loader land in the scope's dead-letter list; the count of stored
    /// rules is returned.
    pub fn load_path(&self, scope: &str, path: impl AsRef<Path>) -> Result<usize> {
        let loaded = crate::loader::load_rules(path)?;
        let count = loaded.rules.len();
        for rule in loaded.rules {
            self.put_rule(scope, rule, None)?;
        }
        for letter in loaded.dead_letters {
            self.quarantine(scope, letter.raw, letter.reason);
        }
        Ok(count)
    }

    /// Bump the firing counters on the latest version of a rule.
    pub fn mark_triggered(&self, scope: &str, rule_id: &str, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        if let Some(latest) = inner
            .get_mut(scope)
            .and_then(|rules| rules.rules.get_mut(rule_id))
            .and_then(|versions| versions.last_mut())
        {
            latest.rule.trigger_count += 1;
            latest.rule.last_triggered_at = Some(at);
        }
    }
}
