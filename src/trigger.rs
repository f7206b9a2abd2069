use serde::{Deserialize, Serialize};

use crate::condition::CompareOp;
use crate::context::TriggerEvent;
use crate::metrics::{evaluate_threshold, MetricName};

/// Event class a rule subscribes to. Discrete workflow triggers carry the
/// parameters that narrow them further; threshold triggers carry the metric
/// comparison applied to the event's snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    EntityStatusChanged {
        #[serde(default)]
        from_status: Option<String>,
        #[serde(default)]
        to_status: Option<String>,
    },
    EntityAssigned,
    DueDateApproaching {
        hours_before: u32,
    },
    DueDatePassed,
    CampaignLaunched,
    /// Cron-style trigger. The engine does not own the clock; an external
    /// scheduler invokes dispatch on a timer and passes the schedule label.
    TimeBased {
        schedule: String,
    },
    MetricThreshold {
        metric: MetricName,
        operator: CompareOp,
        value: f64,
    },
}

/// Discriminant used by callers to announce which event class fired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    EntityStatusChanged,
    EntityAssigned,
    DueDateApproaching,
    DueDatePassed,
    CampaignLaunched,
    TimeBased,
    MetricThreshold,
}

impl TriggerSpec {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerSpec::EntityStatusChanged { .. } => TriggerKind::EntityStatusChanged,
            TriggerSpec::EntityAssigned => TriggerKind::EntityAssigned,
            TriggerSpec::DueDateApproaching { .. } => TriggerKind::DueDateApproaching,
            TriggerSpec::DueDatePassed => TriggerKind::DueDatePassed,
            TriggerSpec::CampaignLaunched => TriggerKind::CampaignLaunched,
            TriggerSpec::TimeBased { .. } => TriggerKind::TimeBased,
            TriggerSpec::MetricThreshold { .. } => TriggerKind::MetricThreshold,
        }
    }

    /// Whether this trigger matches the fired event. Malformed or
    /// under-specified events never match; they never error.
    pub fn matches(&self, kind: TriggerKind, event: &TriggerEvent) -> bool {
        if self.kind() != kind {
            return false;
        }
        match self {
            TriggerSpec::EntityStatusChanged {
                from_status,
                to_status,
            } => {
                let from_ok = from_status
                    .as_deref()
                    .map(|wanted| event.previous_status() == Some(wanted))
                    .unwrap_or(true);
                let to_ok = to_status
                    .as_deref()
                    .map(|wanted| event.status() == Some(wanted))
                    .unwrap_or(true);
                from_ok && to_ok
            }
            TriggerSpec::DueDateApproaching { hours_before } => event
                .hours_until_due
                .map(|hours| hours >= 0.0 && hours <= f64::from(*hours_before))
                .unwrap_or(false),
            TriggerSpec::TimeBased { schedule } => event
                .schedule
                .as_deref()
                .map(|label| label == schedule)
                .unwrap_or(true),
            TriggerSpec::MetricThreshold {
                metric,
                operator,
                value,
            } => event
                .metrics
                .as_ref()
                .map(|snapshot| evaluate_threshold(*metric, *operator, *value, snapshot))
                .unwrap_or(false),
            TriggerSpec::EntityAssigned
            | TriggerSpec::DueDatePassed
            | TriggerSpec::CampaignLaunched => true,
        }
    }
}
