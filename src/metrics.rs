use serde::{Deserialize, Serialize};

use crate::condition::CompareOp;

/// Read-only numeric view of one optimizable entity (an ad or a campaign)
/// at evaluation time. Owned by the entity store; the engine never caches a
/// snapshot beyond a single evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(default)]
    pub impressions: f64,
    #[serde(default)]
    pub clicks: f64,
    #[serde(default)]
    pub conversions: f64,
    #[serde(default)]
    pub ctr: f64,
    #[serde(default)]
    pub cpc: f64,
    #[serde(default)]
    pub cpm: f64,
    #[serde(default)]
    pub roas: f64,
    #[serde(default)]
    pub budget: f64,
    #[serde(default)]
    pub spent_amount: f64,
}

impl MetricSnapshot {
    /// Spent budget as a percentage, guarded against a zero budget.
    pub fn budget_spent_percent(&self) -> f64 {
        if self.budget > 0.0 {
            self.spent_amount / self.budget * 100.0
        } else {
            0.0
        }
    }
}

/// Metric a threshold trigger compares against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    Impressions,
    Clicks,
    Conversions,
    Ctr,
    Cpc,
    Cpm,
    Roas,
    Budget,
    SpentAmount,
    BudgetSpentPercent,
}

impl MetricName {
    pub fn read(&self, snapshot: &MetricSnapshot) -> f64 {
        match self {
            MetricName::Impressions => snapshot.impressions,
            MetricName::Clicks => snapshot.clicks,
            MetricName::Conversions => snapshot.conversions,
            MetricName::Ctr => snapshot.ctr,
            MetricName::Cpc => snapshot.cpc,
            MetricName::Cpm => snapshot.cpm,
            MetricName::Roas => snapshot.roas,
            MetricName::Budget => snapshot.budget,
            MetricName::SpentAmount => snapshot.spent_amount,
            MetricName::BudgetSpentPercent => snapshot.budget_spent_percent(),
        }
    }
}

/// Threshold evaluation: a condition evaluator specialized to one metric and
/// one live snapshot. Shares [`CompareOp`] numeric semantics with the generic
/// condition evaluator.
pub fn evaluate_threshold(
    metric: MetricName,
    operator: CompareOp,
    value: f64,
    snapshot: &MetricSnapshot,
) -> bool {
    operator.compare_numbers(metric.read(snapshot), value)
}
