//! Action handler registry: a dispatch table keyed by action tag, with one
//! built-in handler per declared action variant. Handlers receive the
//! already-interpolated action plus the context and report a result object;
//! only an entity-store failure propagates as an error, everything else is
//! captured in the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::action::{Action, BudgetDirection, RecipientType};
use crate::collab::{
    Email, EmailSender, EntityStore, NewEntity, Notification, NotificationSender, WebhookPoster,
};
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::template::render_value;

/// Retries for optimistic budget/status writes before giving up.
const CAS_RETRIES: u32 = 3;

/// Upper bound on a single outbound webhook call.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one executed action, with a human-readable description for the
/// audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub detail: String,
}

impl ActionResult {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Any type executing an interpolated action against a context qualifies as
/// a handler, which keeps every built-in individually replaceable in tests.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult>;
}

/// External collaborators shared by the built-in handlers.
#[derive(Clone)]
pub struct Collaborators {
    pub entities: Arc<dyn EntityStore>,
    pub notifications: Arc<dyn NotificationSender>,
    pub email: Arc<dyn EmailSender>,
    pub webhooks: Arc<dyn WebhookPoster>,
}

/// Dispatch table keyed by action tag.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in handler.
    pub fn with_builtins(collab: Collaborators) -> Self {
        let mut registry = Self::new();
        registry.register(
            "send_notification",
            Arc::new(NotifyHandler {
                notifications: collab.notifications.clone(),
            }),
        );
        registry.register(
            "create_entity",
            Arc::new(CreateEntityHandler {
                entities: collab.entities.clone(),
            }),
        );
        registry.register(
            "update_field",
            Arc::new(UpdateFieldHandler {
                entities: collab.entities.clone(),
            }),
        );
        registry.register(
            "assign_user",
            Arc::new(AssignUserHandler {
                entities: collab.entities.clone(),
            }),
        );
        registry.register(
            "call_webhook",
            Arc::new(WebhookHandler {
                webhooks: collab.webhooks.clone(),
            }),
        );
        registry.register(
            "send_email",
            Arc::new(EmailHandler {
                email: collab.email.clone(),
            }),
        );
        registry.register(
            "change_status",
            Arc::new(ChangeStatusHandler {
                entities: collab.entities.clone(),
            }),
        );
        registry.register(
            "change_budget",
            Arc::new(ChangeBudgetHandler {
                entities: collab.entities,
            }),
        );
        registry
    }

    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(tag.into(), handler);
    }

    /// Execute one interpolated action. An unregistered tag is a handled
    /// failure, never a crash.
    pub async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult> {
        match self.handlers.get(action.kind()) {
            Some(handler) => {
                let result = handler.execute(action, context).await?;
                debug!(action = action.kind(), success = result.success, "action executed");
                Ok(result)
            }
            None => {
                warn!(action = action.kind(), "no handler registered for action");
                Ok(ActionResult::failed(format!(
                    "no handler registered for {}",
                    action.kind()
                )))
            }
        }
    }
}

fn entity_id(context: &Context) -> Option<String> {
    context
        .get(&"entity.id".into())
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn resolve_recipient(recipient_type: RecipientType, context: &Context) -> String {
    let path = match recipient_type {
        RecipientType::Assignee => "entity.assignee_id",
        RecipientType::Creator => "entity.created_by",
        RecipientType::ProjectMembers => "entity.project_id",
    };
    context
        .get(&path.into())
        .map(render_value)
        .unwrap_or_default()
}

struct NotifyHandler {
    notifications: Arc<dyn NotificationSender>,
}

#[async_trait]
impl ActionHandler for NotifyHandler {
    async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult> {
        let Action::SendNotification {
            title,
            message,
            recipient_type,
        } = action
        else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        let notification = Notification {
            title: title.clone(),
            message: message.clone(),
            recipient_type: *recipient_type,
            recipient: resolve_recipient(*recipient_type, context),
        };
        match self.notifications.send(notification).await {
            Ok(()) => Ok(ActionResult::ok(format!("notification sent: {title}"))),
            Err(err) => Ok(ActionResult::failed(format!(
                "notification delivery failed: {err}"
            ))),
        }
    }
}

struct EmailHandler {
    email: Arc<dyn EmailSender>,
}

#[async_trait]
impl ActionHandler for EmailHandler {
    async fn execute(&self, action: &Action, _context: &Context) -> Result<ActionResult> {
        let Action::SendEmail { to, subject, body } = action else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        let email = Email {
            to: to.clone(),
            subject: subject.clone(),
            body: body.clone(),
        };
        match self.email.send(email).await {
            Ok(()) => Ok(ActionResult::ok(format!("email sent to {to}"))),
            Err(err) => Ok(ActionResult::failed(format!("email delivery failed: {err}"))),
        }
    }
}

struct WebhookHandler {
    webhooks: Arc<dyn WebhookPoster>,
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    async fn execute(&self, action: &Action, _context: &Context) -> Result<ActionResult> {
        let Action::CallWebhook {
            url,
            payload_template,
        } = action
        else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        // Fire-and-forget from the dispatcher's perspective, but bounded and
        // never silently swallowed.
        match tokio::time::timeout(WEBHOOK_TIMEOUT, self.webhooks.post(url, payload_template)).await
        {
            Ok(Ok(())) => Ok(ActionResult::ok(format!("webhook posted to {url}"))),
            Ok(Err(err)) => Ok(ActionResult::failed(format!("webhook failed: {err}"))),
            Err(_) => Ok(ActionResult::failed(format!(
                "webhook to {url} timed out after {}s",
                WEBHOOK_TIMEOUT.as_secs()
            ))),
        }
    }
}

struct CreateEntityHandler {
    entities: Arc<dyn EntityStore>,
}

#[async_trait]
impl ActionHandler for CreateEntityHandler {
    async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult> {
        let Action::CreateEntity {
            title_template,
            due_offset_days,
            priority,
        } = action
        else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        let entity = NewEntity {
            title: title_template.clone(),
            due_at: due_offset_days.map(|days| Utc::now() + chrono::Duration::days(days)),
            priority: priority.clone(),
            scope_id: context
                .get(&"entity.project_id".into())
                .and_then(Value::as_str)
                .map(str::to_owned),
        };
        match self.entities.create_entity(entity).await {
            Ok(id) => Ok(ActionResult::ok(format!("created entity {id}"))),
            Err(err) => store_failure(err, "entity creation"),
        }
    }
}

struct UpdateFieldHandler {
    entities: Arc<dyn EntityStore>,
}

#[async_trait]
impl ActionHandler for UpdateFieldHandler {
    async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult> {
        let Action::UpdateField {
            path,
            value_template,
        } = action
        else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        let Some(id) = entity_id(context) else {
            return Ok(ActionResult::failed("context carries no entity id"));
        };
        match self
            .entities
            .update_field(&id, path, Value::String(value_template.clone()))
            .await
        {
            Ok(()) => Ok(ActionResult::ok(format!("set {path} on {id}"))),
            Err(err) => store_failure(err, "field update"),
        }
    }
}

struct AssignUserHandler {
    entities: Arc<dyn EntityStore>,
}

#[async_trait]
impl ActionHandler for AssignUserHandler {
    async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult> {
        let Action::AssignUser { strategy } = action else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        let Some(id) = entity_id(context) else {
            return Ok(ActionResult::failed("context carries no entity id"));
        };
        match self.entities.assign_user(&id, *strategy).await {
            Ok(user) => Ok(ActionResult::ok(format!("assigned {user} to {id}"))),
            Err(err) => store_failure(err, "assignment"),
        }
    }
}

struct ChangeStatusHandler {
    entities: Arc<dyn EntityStore>,
}

#[async_trait]
impl ActionHandler for ChangeStatusHandler {
    async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult> {
        let Action::ChangeStatus { target } = action else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        let Some(id) = entity_id(context) else {
            return Ok(ActionResult::failed("context carries no entity id"));
        };
        for _ in 0..CAS_RETRIES {
            let entity = match self.entities.fetch_entity(&id).await {
                Ok(entity) => entity,
                Err(err) => return store_failure(err, "status change"),
            };
            let observed = entity.get("status").cloned().unwrap_or(Value::Null);
            if observed.as_str() == Some(target.as_str()) {
                return Ok(ActionResult::ok(format!("{id} already {target}")));
            }
            match self
                .entities
                .compare_and_update(&id, "status", &observed, json!(target))
                .await
            {
                Ok(true) => {
                    return Ok(ActionResult::ok(format!(
                        "status of {id} changed to {target}"
                    )))
                }
                Ok(false) => continue,
                Err(err) => return store_failure(err, "status change"),
            }
        }
        Ok(ActionResult::failed(format!(
            "status of {id} kept changing, gave up after {CAS_RETRIES} attempts"
        )))
    }
}

struct ChangeBudgetHandler {
    entities: Arc<dyn EntityStore>,
}

#[async_trait]
impl ActionHandler for ChangeBudgetHandler {
    async fn execute(&self, action: &Action, context: &Context) -> Result<ActionResult> {
        let Action::ChangeBudget { direction, percent } = action else {
            return Ok(ActionResult::failed("unexpected action variant"));
        };
        let Some(id) = entity_id(context) else {
            return Ok(ActionResult::failed("context carries no entity id"));
        };
        let factor = match direction {
            BudgetDirection::Increase => 1.0 + percent / 100.0,
            BudgetDirection::Decrease => 1.0 - percent / 100.0,
        };
        // Read-modify-write with optimistic concurrency: two rules adjusting
        // the same budget serialize instead of losing an update.
        for _ in 0..CAS_RETRIES {
            let entity = match self.entities.fetch_entity(&id).await {
                Ok(entity) => entity,
                Err(err) => return store_failure(err, "budget change"),
            };
            let Some(observed) = entity.get("budget").and_then(Value::as_f64) else {
                return Ok(ActionResult::failed(format!("{id} has no numeric budget")));
            };
            let replacement = observed * factor;
            match self
                .entities
                .compare_and_update(&id, "budget", &json!(observed), json!(replacement))
                .await
            {
                Ok(true) => {
                    return Ok(ActionResult::ok(format!(
                        "budget of {id} {} by {percent}% ({observed} -> {replacement})",
                        match direction {
                            BudgetDirection::Increase => "increased",
                            BudgetDirection::Decrease => "decreased",
                        }
                    )))
                }
                Ok(false) => continue,
                Err(err) => return store_failure(err, "budget change"),
            }
        }
        Ok(ActionResult::failed(format!(
            "budget of {id} kept changing, gave up after {CAS_RETRIES} attempts"
        )))
    }
}

/// Entity-not-found is a handled per-action failure; anything else from the
/// store aborts the remaining actions of the current rule.
fn store_failure(err: EngineError, what: &str) -> Result<ActionResult> {
    match err {
        EngineError::EntityNotFound(id) => {
            Ok(ActionResult::failed(format!("{what} failed: entity {id} not found")))
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::testing::{FakeDelivery, FakeEntityStore};
    use crate::context::Context;

    fn registry_with(store: Arc<FakeEntityStore>, delivery: Arc<FakeDelivery>) -> HandlerRegistry {
        HandlerRegistry::with_builtins(Collaborators {
            entities: store,
            notifications: delivery.clone(),
            email: delivery.clone(),
            webhooks: delivery,
        })
    }

    fn ad_context() -> Context {
        Context::from_value(json!({"entity": {"id": "ad-1", "status": "ACTIVE", "budget": 1000.0}}))
    }

    #[tokio::test]
    async fn budget_increase_applies_the_percentage() {
        let store = Arc::new(FakeEntityStore::with_entity(
            "ad-1",
            json!({"id": "ad-1", "budget": 1000.0}),
        ));
        let registry = registry_with(store.clone(), Arc::new(FakeDelivery::default()));

        let result = registry
            .execute(
                &Action::ChangeBudget {
                    direction: BudgetDirection::Increase,
                    percent: 25.0,
                },
                &ad_context(),
            )
            .await
            .unwrap();

        assert!(result.success, "{}", result.detail);
        assert_eq!(store.budget_of("ad-1"), Some(1250.0));
    }

    #[tokio::test]
    async fn concurrent_budget_increases_are_not_lost() {
        let store = Arc::new(FakeEntityStore::with_entity(
            "ad-1",
            json!({"id": "ad-1", "budget": 1000.0}),
        ));
        let registry = Arc::new(registry_with(
            store.clone(),
            Arc::new(FakeDelivery::default()),
        ));
        let action = Action::ChangeBudget {
            direction: BudgetDirection::Increase,
            percent: 10.0,
        };

        let first = {
            let registry = registry.clone();
            let action = action.clone();
            tokio::spawn(async move { registry.execute(&action, &ad_context()).await })
        };
        let second = {
            let registry = registry.clone();
            let action = action.clone();
            tokio::spawn(async move { registry.execute(&action, &ad_context()).await })
        };
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(first.success && second.success);
        // Sequential application: 1000 * 1.1 * 1.1, never two writers both
        // landing at 1100.
        let budget = store.budget_of("ad-1").unwrap();
        assert!((budget - 1210.0).abs() < 1e-6, "lost update: {budget}");
    }

    #[tokio::test]
    async fn status_change_is_idempotent() {
        let store = Arc::new(FakeEntityStore::with_entity(
            "ad-1",
            json!({"id": "ad-1", "status": "PAUSED"}),
        ));
        let registry = registry_with(store.clone(), Arc::new(FakeDelivery::default()));

        let result = registry
            .execute(
                &Action::ChangeStatus {
                    target: "PAUSED".into(),
                },
                &ad_context(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(*store.cas_attempts.lock(), 0, "no write for a no-op");
    }

    #[tokio::test]
    async fn webhook_failure_is_a_result_not_an_error() {
        let delivery = Arc::new(FakeDelivery::default());
        *delivery.webhook_down.lock() = true;
        let registry = registry_with(Arc::new(FakeEntityStore::default()), delivery);

        let result = registry
            .execute(
                &Action::CallWebhook {
                    url: "https://hooks.example.com/x".into(),
                    payload_template: json!({"text": "hi"}),
                },
                &ad_context(),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.detail.contains("webhook failed"));
    }

    #[tokio::test]
    async fn missing_entity_is_a_handled_failure() {
        let registry = registry_with(
            Arc::new(FakeEntityStore::default()),
            Arc::new(FakeDelivery::default()),
        );
        let result = registry
            .execute(
                &Action::ChangeBudget {
                    direction: BudgetDirection::Increase,
                    percent: 10.0,
                },
                &ad_context(),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.detail.contains("not found"));
    }

    #[tokio::test]
    async fn unreachable_store_propagates_as_error() {
        let store = Arc::new(FakeEntityStore::default());
        *store.unreachable.lock() = true;
        let registry = registry_with(store, Arc::new(FakeDelivery::default()));

        let outcome = registry
            .execute(
                &Action::ChangeStatus {
                    target: "PAUSED".into(),
                },
                &ad_context(),
            )
            .await;

        assert!(matches!(outcome, Err(EngineError::Store(_))));
    }

    #[tokio::test]
    async fn notification_resolves_its_recipient() {
        let delivery = Arc::new(FakeDelivery::default());
        let registry = registry_with(Arc::new(FakeEntityStore::default()), delivery.clone());
        let context = Context::from_value(json!({
            "entity": {"id": "t-1", "assignee_id": "user-7"}
        }));

        let result = registry
            .execute(
                &Action::SendNotification {
                    title: "New task".into(),
                    message: "You have work".into(),
                    recipient_type: RecipientType::Assignee,
                },
                &context,
            )
            .await
            .unwrap();

        assert!(result.success);
        let sent = delivery.notifications.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "user-7");
    }

    #[tokio::test]
    async fn empty_registry_reports_unhandled_tags() {
        let registry = HandlerRegistry::new();
        let result = registry
            .execute(
                &Action::ChangeStatus {
                    target: "PAUSED".into(),
                },
                &ad_context(),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.detail.contains("no handler registered"));
    }
}
