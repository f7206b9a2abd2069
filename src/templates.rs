//! Prebuilt rules the platform offers as starting points: the classic
//! workflow automations and the stock ad-optimization thresholds. Callers
//! clone, rescope and tweak them before storing.

use chrono::Utc;
use serde_json::json;

use crate::action::{Action, BudgetDirection, RecipientType};
use crate::condition::{CompareOp, Condition};
use crate::metrics::MetricName;
use crate::rule::Rule;
use crate::trigger::TriggerSpec;

fn template(id: &str, name: &str, description: &str, trigger: TriggerSpec, actions: Vec<Action>) -> Rule {
    Rule {
        id: id.into(),
        name: name.into(),
        description: Some(description.into()),
        trigger,
        conditions: vec![],
        actions,
        enabled: true,
        scope_id: None,
        created_by: "template".into(),
        created_at: Utc::now(),
        last_triggered_at: None,
        trigger_count: 0,
    }
}

/// Notify the assignee when a task lands on their plate.
pub fn notify_on_assignment() -> Rule {
    template(
        "notify-on-assignment",
        "Notify on Task Assignment",
        "Send notification when a task is assigned to someone",
        TriggerSpec::EntityAssigned,
        vec![Action::SendNotification {
            title: "New Task Assigned".into(),
            message: "You have been assigned a new task: {{task.title}}".into(),
            recipient_type: RecipientType::Assignee,
        }],
    )
}

/// Remind the assignee when the due date is inside the given window.
pub fn due_date_reminder(hours_before: u32) -> Rule {
    template(
        "due-date-reminder",
        "Due Date Reminder",
        "Notify assignee when task is due soon",
        TriggerSpec::DueDateApproaching { hours_before },
        vec![Action::SendNotification {
            title: "Task Due Soon".into(),
            message: format!("{{{{task.title}}}} is due in {hours_before} hours"),
            recipient_type: RecipientType::Assignee,
        }],
    )
}

/// Move a finished task with subtasks into review.
pub fn move_to_review_on_complete() -> Rule {
    let mut rule = template(
        "move-to-review",
        "Move to Review on Complete",
        "When a task with subtasks is done, move it to Review",
        TriggerSpec::EntityStatusChanged {
            from_status: Some("IN_PROGRESS".into()),
            to_status: Some("DONE".into()),
        },
        vec![Action::ChangeStatus {
            target: "REVIEW".into(),
        }],
    );
    rule.conditions = vec![Condition::new(
        "task.has_subtasks",
        CompareOp::Equals,
        json!(true),
    )];
    rule
}

/// Create a follow-up review task a week after a campaign launches.
pub fn follow_up_on_campaign_launch() -> Rule {
    template(
        "campaign-follow-up",
        "Create Follow-up Task",
        "Create follow-up task when a campaign launches",
        TriggerSpec::CampaignLaunched,
        vec![Action::CreateEntity {
            title_template: "Review {{campaign.name}} Performance".into(),
            due_offset_days: Some(7),
            priority: Some("HIGH".into()),
        }],
    )
}

/// Post a chat webhook when a project changes status.
pub fn status_change_webhook(url: &str) -> Rule {
    template(
        "status-webhook",
        "Chat Notification",
        "Send chat message when project status changes",
        TriggerSpec::EntityStatusChanged {
            from_status: None,
            to_status: None,
        },
        vec![Action::CallWebhook {
            url: url.into(),
            payload_template: json!({
                "text": "Project {{project.name}} moved to {{project.status}}"
            }),
        }],
    )
}

fn threshold(metric: MetricName, operator: CompareOp, value: f64) -> TriggerSpec {
    TriggerSpec::MetricThreshold {
        metric,
        operator,
        value,
    }
}

/// Pause ads whose CTR drops below 0.5%.
pub fn pause_low_ctr() -> Rule {
    template(
        "pause-low-ctr",
        "Pause Low CTR Ads",
        "Pause ads whose click-through rate falls under 0.5",
        threshold(MetricName::Ctr, CompareOp::LessThan, 0.5),
        vec![Action::ChangeStatus {
            target: "PAUSED".into(),
        }],
    )
}

/// Pause ads paying more than 5.0 per click.
pub fn pause_high_cpc() -> Rule {
    template(
        "pause-high-cpc",
        "Pause High CPC Ads",
        "Pause ads whose cost per click exceeds 5.0",
        threshold(MetricName::Cpc, CompareOp::GreaterThan, 5.0),
        vec![Action::ChangeStatus {
            target: "PAUSED".into(),
        }],
    )
}

/// Grow the budget of ads returning more than 3x.
pub fn boost_high_roas() -> Rule {
    template(
        "boost-high-roas",
        "Boost High ROAS Ads",
        "Increase budget by 20% when return on ad spend exceeds 3.0",
        threshold(MetricName::Roas, CompareOp::GreaterThan, 3.0),
        vec![Action::ChangeBudget {
            direction: BudgetDirection::Increase,
            percent: 20.0,
        }],
    )
}

/// Cut the budget of ads returning less than 1x.
pub fn cut_low_roas() -> Rule {
    template(
        "cut-low-roas",
        "Reduce Low ROAS Budget",
        "Decrease budget by 30% when return on ad spend falls under 1.0",
        threshold(MetricName::Roas, CompareOp::LessThan, 1.0),
        vec![Action::ChangeBudget {
            direction: BudgetDirection::Decrease,
            percent: 30.0,
        }],
    )
}

/// Warn the rule author when 80% of the budget is gone.
pub fn budget_alert() -> Rule {
    template(
        "budget-alert",
        "Budget Alert at 80%",
        "Notify when 80% of the budget has been spent",
        threshold(MetricName::BudgetSpentPercent, CompareOp::GreaterThan, 80.0),
        vec![Action::SendNotification {
            title: "Budget Alert".into(),
            message: "{{ad.name}} has spent {{metrics.spent_amount}} of {{metrics.budget}}".into(),
            recipient_type: RecipientType::Creator,
        }],
    )
}

/// Every built-in template.
pub fn all() -> Vec<Rule> {
    vec![
        notify_on_assignment(),
        due_date_reminder(24),
        move_to_review_on_complete(),
        follow_up_on_campaign_launch(),
        pause_low_ctr(),
        pause_high_cpc(),
        boost_high_roas(),
        cut_low_roas(),
        budget_alert(),
    ]
}
