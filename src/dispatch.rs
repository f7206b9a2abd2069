use chrono::Utc;
use tracing::{debug, warn};

use crate::audit::{AuditRecord, Auditor};
use crate::condition::evaluate_all;
use crate::context::{Context, TriggerEvent};
use crate::handler::{ActionResult, HandlerRegistry};
use crate::rule::Rule;
use crate::store::RuleStore;
use crate::trigger::TriggerKind;

/// Drives trigger matching, condition evaluation, interpolation and action
/// execution for one event. Stateless and re-entrant: every invocation is an
/// independent unit of work, and the dispatcher owns no threads or timers.
pub struct TriggerDispatcher {
    store: RuleStore,
    registry: HandlerRegistry,
    auditor: Auditor,
}

impl TriggerDispatcher {
    pub fn new(store: RuleStore, registry: HandlerRegistry, auditor: Auditor) -> Self {
        Self {
            store,
            registry,
            auditor,
        }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Trigger invocation contract: called synchronously by the entity-store
    /// write path or the scheduler after the state change occurred. Reads the
    /// latest enabled rules for the scope, dispatches, and bumps the firing
    /// counters on every rule whose conditions passed.
    pub async fn on_trigger(
        &self,
        scope: &str,
        kind: TriggerKind,
        event: &TriggerEvent,
    ) -> Vec<AuditRecord> {
        let rules = self.store.enabled_rules(scope);
        let records = self.dispatch_rules(kind, event, &rules).await;
        for record in &records {
            if record.matched_conditions {
                self.store.mark_triggered(scope, &record.rule_id, Utc::now());
            }
        }
        records
    }

    /// Core dispatch over an explicit rule list. One audit record per rule
    /// whose trigger matched; rules whose conditions pass attempt every
    /// declared action, one failing action never cancels its siblings, and
    /// only a store failure aborts the rest of the current rule.
    pub async fn dispatch_rules(
        &self,
        kind: TriggerKind,
        event: &TriggerEvent,
        rules: &[Rule],
    ) -> Vec<AuditRecord> {
        let mut records = Vec::new();
        for rule in rules {
            if !rule.is_enabled() || !rule.trigger.matches(kind, event) {
                continue;
            }
            let context = Context::from_event(event);
            if !evaluate_all(&rule.conditions, &context) {
                records.push(
                    self.auditor
                        .record(AuditRecord::conditions_failed(&rule.id))
                        .await,
                );
                continue;
            }
            debug!(rule_id = %rule.id, "rule fired");
            let mut record = AuditRecord::new(&rule.id);
            for action in &rule.actions {
                let resolved = action.interpolated(&context);
                match self.registry.execute(&resolved, &context).await {
                    Ok(result) => record.push(resolved, result),
                    Err(err) => {
                        // Persistence failure: record it and abort the rest
                        // of this rule only. Sibling rules still run.
                        warn!(rule_id = %rule.id, error = %err, "rule aborted on store failure");
                        record.push(resolved, ActionResult::failed(err.to_string()));
                        break;
                    }
                }
            }
            records.push(self.auditor.record(record).await);
        }
        records
    }
}
