//! Advisory recommendation generator: scored, human-reviewable suggestions
//! computed from a metric snapshot. Pull-based and deterministic; nothing is
//! executed unless a caller explicitly promotes a recommendation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::action::{Action, BudgetDirection};
use crate::audit::{AuditRecord, Auditor};
use crate::collab::EntityStore;
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::handler::{ActionResult, HandlerRegistry};
use crate::metrics::MetricSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Budget,
    Targeting,
    Creative,
    Schedule,
}

/// Advisory, non-binding suggestion. Becomes an executed action only when a
/// caller promotes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    /// Fixed confidence tied to the heuristic that produced the suggestion.
    pub confidence: f64,
    pub suggestion: String,
    pub expected_impact: String,
    #[serde(default)]
    pub action: Option<Action>,
}

/// Heuristic thresholds, configuration rather than magic numbers buried in
/// the generator. Defaults mirror the platform's tuned values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvisorThresholds {
    /// ROAS above which budget headroom should be spent.
    pub high_roas: f64,
    /// Fraction of budget still unspent that counts as headroom.
    pub headroom_ratio: f64,
    /// ROAS below which spend should be pulled back.
    pub low_roas: f64,
    /// Fraction of budget spent that counts as significant.
    pub significant_spend_ratio: f64,
    /// CTR below which creatives look stale.
    pub low_ctr: f64,
    /// Impressions needed before a CTR verdict means anything.
    pub min_impressions_for_ctr: f64,
    /// CPC above which targeting looks too broad.
    pub high_cpc: f64,
    /// Impressions above which low conversions suggest bad scheduling.
    pub dayparting_min_impressions: f64,
    /// Conversion count below which dayparting is suggested.
    pub dayparting_max_conversions: f64,
    /// Budget increase proposed for high-ROAS entities, percent.
    pub increase_percent: f64,
    /// Budget decrease proposed for low-ROAS entities, percent.
    pub decrease_percent: f64,
}

impl Default for AdvisorThresholds {
    fn default() -> Self {
        Self {
            high_roas: 2.5,
            headroom_ratio: 0.5,
            low_roas: 1.0,
            significant_spend_ratio: 0.3,
            low_ctr: 0.5,
            min_impressions_for_ctr: 1000.0,
            high_cpc: 3.0,
            dayparting_min_impressions: 5000.0,
            dayparting_max_conversions: 10.0,
            increase_percent: 25.0,
            decrease_percent: 30.0,
        }
    }
}

const CONFIDENCE_BUDGET_INCREASE: f64 = 0.85;
const CONFIDENCE_BUDGET_DECREASE: f64 = 0.9;
const CONFIDENCE_CREATIVE: f64 = 0.75;
const CONFIDENCE_TARGETING: f64 = 0.8;
const CONFIDENCE_SCHEDULE: f64 = 0.7;

/// Pure function of one snapshot: same input, same recommendation list.
pub fn generate(snapshot: &MetricSnapshot, thresholds: &AdvisorThresholds) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if snapshot.roas > thresholds.high_roas
        && snapshot.spent_amount < snapshot.budget * thresholds.headroom_ratio
    {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Budget,
            confidence: CONFIDENCE_BUDGET_INCREASE,
            suggestion: format!(
                "Increase daily budget by {}% to capture more high-ROAS conversions",
                thresholds.increase_percent
            ),
            expected_impact: "+15-20% conversions".into(),
            action: Some(Action::ChangeBudget {
                direction: BudgetDirection::Increase,
                percent: thresholds.increase_percent,
            }),
        });
    }

    if snapshot.roas < thresholds.low_roas
        && snapshot.spent_amount > snapshot.budget * thresholds.significant_spend_ratio
    {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Budget,
            confidence: CONFIDENCE_BUDGET_DECREASE,
            suggestion: format!(
                "Reduce budget by {}% and optimize targeting before spending more",
                thresholds.decrease_percent
            ),
            expected_impact: format!("Save {}% budget, improve efficiency", thresholds.decrease_percent),
            action: Some(Action::ChangeBudget {
                direction: BudgetDirection::Decrease,
                percent: thresholds.decrease_percent,
            }),
        });
    }

    if snapshot.ctr < thresholds.low_ctr && snapshot.impressions > thresholds.min_impressions_for_ctr
    {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Creative,
            confidence: CONFIDENCE_CREATIVE,
            suggestion: "Low CTR detected. Consider testing new ad creatives or headlines".into(),
            expected_impact: "+50-100% CTR improvement".into(),
            action: None,
        });
    }

    if snapshot.cpc > thresholds.high_cpc {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Targeting,
            confidence: CONFIDENCE_TARGETING,
            suggestion: "High CPC detected. Refine audience targeting to reduce competition".into(),
            expected_impact: "-20-40% CPC reduction".into(),
            action: None,
        });
    }

    if snapshot.impressions > thresholds.dayparting_min_impressions
        && snapshot.conversions < thresholds.dayparting_max_conversions
    {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Schedule,
            confidence: CONFIDENCE_SCHEDULE,
            suggestion: "Consider dayparting - run ads only during peak conversion hours".into(),
            expected_impact: "+30% conversion rate".into(),
            action: None,
        });
    }

    recommendations
}

/// Advisory pull endpoint plus the promotion path back into the handler
/// registry.
pub struct Advisor {
    thresholds: AdvisorThresholds,
    entities: Arc<dyn EntityStore>,
    registry: Arc<HandlerRegistry>,
    auditor: Auditor,
}

impl Advisor {
    pub fn new(
        thresholds: AdvisorThresholds,
        entities: Arc<dyn EntityStore>,
        registry: Arc<HandlerRegistry>,
        auditor: Auditor,
    ) -> Self {
        Self {
            thresholds,
            entities,
            registry,
            auditor,
        }
    }

    /// Fresh recommendations for one entity's current metric snapshot.
    pub async fn recommendations(&self, entity_id: &str) -> Result<Vec<Recommendation>> {
        let snapshot = self.entities.fetch_metrics(entity_id).await?;
        let recommendations = generate(&snapshot, &self.thresholds);
        debug!(entity_id, count = recommendations.len(), "generated recommendations");
        Ok(recommendations)
    }

    /// Promote one recommendation to execution, exactly as a rule-triggered
    /// action would run. A recommendation without an action is a no-op that
    /// still yields a well-formed audit record.
    pub async fn promote(&self, entity_id: &str, index: usize) -> Result<AuditRecord> {
        let snapshot = self.entities.fetch_metrics(entity_id).await?;
        let recommendations = generate(&snapshot, &self.thresholds);
        let recommendation = recommendations
            .get(index)
            .ok_or(EngineError::RecommendationNotFound { index })?;

        let mut record = AuditRecord::new(format!("advisory:{entity_id}"));
        if let Some(action) = &recommendation.action {
            let entity = self.entities.fetch_entity(entity_id).await?;
            let context = Context::from_value(json!({
                "entity": entity,
                "metrics": snapshot,
            }));
            let resolved = action.interpolated(&context);
            match self.registry.execute(&resolved, &context).await {
                Ok(result) => record.push(resolved, result),
                Err(err) => record.push(resolved, ActionResult::failed(err.to_string())),
            }
        }
        Ok(self.auditor.record(record).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::testing::{FakeAuditSink, FakeDelivery, FakeEntityStore};
    use crate::handler::Collaborators;

    fn snapshot(roas: f64, spent: f64, budget: f64, ctr: f64, impressions: f64) -> MetricSnapshot {
        MetricSnapshot {
            roas,
            spent_amount: spent,
            budget,
            ctr,
            impressions,
            ..MetricSnapshot::default()
        }
    }

    #[test]
    fn low_roas_with_spend_suggests_only_a_decrease() {
        let recommendations = generate(
            &snapshot(0.6, 400.0, 1000.0, 2.0, 2000.0),
            &AdvisorThresholds::default(),
        );

        let budget: Vec<_> = recommendations
            .iter()
            .filter(|r| r.kind == RecommendationKind::Budget)
            .collect();
        assert_eq!(budget.len(), 1);
        assert!(matches!(
            budget[0].action,
            Some(Action::ChangeBudget {
                direction: BudgetDirection::Decrease,
                ..
            })
        ));
    }

    #[test]
    fn high_roas_with_headroom_suggests_an_increase() {
        let recommendations = generate(
            &snapshot(3.0, 200.0, 1000.0, 2.0, 500.0),
            &AdvisorThresholds::default(),
        );
        assert!(recommendations.iter().any(|r| matches!(
            r.action,
            Some(Action::ChangeBudget {
                direction: BudgetDirection::Increase,
                ..
            })
        )));
    }

    #[test]
    fn generation_is_deterministic() {
        let metrics = snapshot(0.8, 900.0, 1000.0, 0.3, 9000.0);
        let thresholds = AdvisorThresholds::default();
        assert_eq!(generate(&metrics, &thresholds), generate(&metrics, &thresholds));
    }

    #[test]
    fn stale_creative_and_dayparting_heuristics_fire_without_actions() {
        let recommendations = generate(
            &snapshot(1.5, 100.0, 1000.0, 0.2, 6000.0),
            &AdvisorThresholds::default(),
        );
        let kinds: Vec<_> = recommendations.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&RecommendationKind::Creative));
        assert!(kinds.contains(&RecommendationKind::Schedule));
        assert!(recommendations
            .iter()
            .filter(|r| r.kind != RecommendationKind::Budget)
            .all(|r| r.action.is_none()));
    }

    fn advisor_over(store: Arc<FakeEntityStore>) -> (Advisor, Arc<FakeAuditSink>) {
        let delivery = Arc::new(FakeDelivery::default());
        let sink = Arc::new(FakeAuditSink::default());
        let registry = Arc::new(HandlerRegistry::with_builtins(Collaborators {
            entities: store.clone(),
            notifications: delivery.clone(),
            email: delivery.clone(),
            webhooks: delivery,
        }));
        (
            Advisor::new(
                AdvisorThresholds::default(),
                store,
                registry,
                Auditor::new(sink.clone()),
            ),
            sink,
        )
    }

    #[tokio::test]
    async fn promoting_a_budget_recommendation_executes_it() {
        let store = Arc::new(FakeEntityStore::with_entity(
            "ad-1",
            serde_json::json!({"id": "ad-1", "budget": 1000.0}),
        ));
        store
            .metrics
            .lock()
            .insert("ad-1".into(), snapshot(3.0, 200.0, 1000.0, 2.0, 500.0));
        let (advisor, sink) = advisor_over(store.clone());

        let record = advisor.promote("ad-1", 0).await.unwrap();

        assert_eq!(record.actions_succeeded, 1);
        assert_eq!(store.budget_of("ad-1"), Some(1250.0));
        assert_eq!(sink.records.lock().len(), 1);
    }

    #[tokio::test]
    async fn promoting_an_actionless_recommendation_is_a_recorded_no_op() {
        let store = Arc::new(FakeEntityStore::default());
        // Only the high-CPC heuristic fires, and it carries no action.
        store
            .metrics
            .lock()
            .insert(
                "ad-2".into(),
                MetricSnapshot {
                    cpc: 4.0,
                    ..MetricSnapshot::default()
                },
            );
        let (advisor, _sink) = advisor_over(store);

        let record = advisor.promote("ad-2", 0).await.unwrap();

        assert!(record.actions_attempted.is_empty());
        assert_eq!(record.actions_succeeded, 0);
        assert_eq!(record.actions_failed, 0);
    }

    #[tokio::test]
    async fn out_of_range_promotion_index_is_an_error() {
        let store = Arc::new(FakeEntityStore::default());
        store
            .metrics
            .lock()
            .insert("ad-3".into(), MetricSnapshot::default());
        let (advisor, _sink) = advisor_over(store);

        let outcome = advisor.promote("ad-3", 5).await;
        assert!(matches!(
            outcome,
            Err(EngineError::RecommendationNotFound { index: 5 })
        ));
    }
}
