use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::action::Action;
use crate::collab::AuditSink;
use crate::handler::ActionResult;

/// Append-only record of one rule firing. Never mutated after it is written
/// to the sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub rule_id: String,
    pub fired_at: DateTime<Utc>,
    pub matched_conditions: bool,
    pub actions_attempted: Vec<Action>,
    pub actions_succeeded: u32,
    pub actions_failed: u32,
    pub errors: Vec<String>,
}

impl AuditRecord {
    /// Record for a rule whose trigger matched and whose conditions passed.
    pub fn new(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            fired_at: Utc::now(),
            matched_conditions: true,
            actions_attempted: Vec::new(),
            actions_succeeded: 0,
            actions_failed: 0,
            errors: Vec::new(),
        }
    }

    /// Record for a rule whose trigger matched but whose conditions failed.
    /// No actions are attempted for such a rule.
    pub fn conditions_failed(rule_id: impl Into<String>) -> Self {
        Self {
            matched_conditions: false,
            ..Self::new(rule_id)
        }
    }

    pub fn push(&mut self, action: Action, result: ActionResult) {
        if result.success {
            self.actions_succeeded += 1;
        } else {
            self.actions_failed += 1;
            self.errors.push(result.detail);
        }
        self.actions_attempted.push(action);
    }
}

/// Writes every firing to the external audit table. A failing sink is logged
/// and never aborts dispatch.
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, record: AuditRecord) -> AuditRecord {
        if let Err(err) = self.sink.append(&record).await {
            warn!(rule_id = %record.rule_id, error = %err, "failed to append audit record");
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{BudgetDirection, RecipientType};

    #[test]
    fn tallies_successes_and_failures() {
        let mut record = AuditRecord::new("boost");
        record.push(
            Action::ChangeBudget {
                direction: BudgetDirection::Increase,
                percent: 25.0,
            },
            ActionResult::ok("budget increased"),
        );
        record.push(
            Action::SendNotification {
                title: "t".into(),
                message: "m".into(),
                recipient_type: RecipientType::Assignee,
            },
            ActionResult::failed("delivery refused"),
        );

        assert_eq!(record.actions_attempted.len(), 2);
        assert_eq!(record.actions_succeeded, 1);
        assert_eq!(record.actions_failed, 1);
        assert_eq!(record.errors, vec!["delivery refused".to_string()]);
    }

    #[test]
    fn conditions_failed_record_attempts_nothing() {
        let record = AuditRecord::conditions_failed("gate");
        assert!(!record.matched_conditions);
        assert!(record.actions_attempted.is_empty());
        assert_eq!(record.actions_succeeded, 0);
        assert_eq!(record.actions_failed, 0);
    }
}
