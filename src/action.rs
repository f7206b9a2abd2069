use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::EngineError;
use crate::template;

/// Who a prepared notification is addressed to, resolved against the
/// triggering entity at execution time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    Assignee,
    Creator,
    ProjectMembers,
}

/// How the assign-user action picks its target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignStrategy {
    RoundRobin,
    LeastBusy,
    Creator,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetDirection {
    Increase,
    Decrease,
}

/// Declared side effect executed when a rule fires. Fields ending in
/// `_template`, and every other string field, may carry `{{path}}` tokens
/// resolved against the context at execution time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SendNotification {
        title: String,
        message: String,
        recipient_type: RecipientType,
    },
    CreateEntity {
        title_template: String,
        #[serde(default)]
        due_offset_days: Option<i64>,
        #[serde(default)]
        priority: Option<String>,
    },
    UpdateField {
        path: String,
        value_template: String,
    },
    AssignUser {
        strategy: AssignStrategy,
    },
    CallWebhook {
        url: String,
        payload_template: Value,
    },
    SendEmail {
        to: String,
        subject: String,
        body: String,
    },
    ChangeStatus {
        target: String,
    },
    ChangeBudget {
        direction: BudgetDirection,
        percent: f64,
    },
}

impl Action {
    /// Stable tag used as the handler registry key and in audit output.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SendNotification { .. } => "send_notification",
            Action::CreateEntity { .. } => "create_entity",
            Action::UpdateField { .. } => "update_field",
            Action::AssignUser { .. } => "assign_user",
            Action::CallWebhook { .. } => "call_webhook",
            Action::SendEmail { .. } => "send_email",
            Action::ChangeStatus { .. } => "change_status",
            Action::ChangeBudget { .. } => "change_budget",
        }
    }

    /// Resolve every templated field against the context, returning the
    /// fully-interpolated action handed to its handler.
    pub fn interpolated(&self, context: &Context) -> Action {
        match self {
            Action::SendNotification {
                title,
                message,
                recipient_type,
            } => Action::SendNotification {
                title: template::resolve(title, context),
                message: template::resolve(message, context),
                recipient_type: *recipient_type,
            },
            Action::CreateEntity {
                title_template,
                due_offset_days,
                priority,
            } => Action::CreateEntity {
                title_template: template::resolve(title_template, context),
                due_offset_days: *due_offset_days,
                priority: priority.clone(),
            },
            Action::UpdateField {
                path,
                value_template,
            } => Action::UpdateField {
                path: path.clone(),
                value_template: template::resolve(value_template, context),
            },
            Action::AssignUser { strategy } => Action::AssignUser {
                strategy: *strategy,
            },
            Action::CallWebhook {
                url,
                payload_template,
            } => Action::CallWebhook {
                url: template::resolve(url, context),
                payload_template: template::resolve_value(payload_template, context),
            },
            Action::SendEmail { to, subject, body } => Action::SendEmail {
                to: template::resolve(to, context),
                subject: template::resolve(subject, context),
                body: template::resolve(body, context),
            },
            Action::ChangeStatus { target } => Action::ChangeStatus {
                target: template::resolve(target, context),
            },
            Action::ChangeBudget { direction, percent } => Action::ChangeBudget {
                direction: *direction,
                percent: *percent,
            },
        }
    }

    pub(crate) fn validate(&self, rule_id: &str) -> Result<(), EngineError> {
        if let Action::ChangeBudget { direction, percent } = self {
            if !percent.is_finite() || *percent <= 0.0 {
                return Err(EngineError::invalid_rule(
                    rule_id,
                    format!("change_budget percent must be positive, got {percent}"),
                ));
            }
            if *direction == BudgetDirection::Decrease && *percent >= 100.0 {
                return Err(EngineError::invalid_rule(
                    rule_id,
                    "change_budget decrease must stay below 100%",
                ));
            }
        }
        Ok(())
    }
}
