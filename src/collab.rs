//! Narrow interfaces to the external collaborators the engine drives:
//! the persistent entity store, the delivery subsystems and the audit table.
//! The engine never learns their transport details, only whether they
//! succeeded. All collaborators are injected at construction; there is no
//! module-level shared client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{AssignStrategy, RecipientType};
use crate::audit::AuditRecord;
use crate::error::Result;
use crate::metrics::MetricSnapshot;

/// Request to create a new entity (e.g. a follow-up task) in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEntity {
    pub title: String,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub scope_id: Option<String>,
}

/// Fully-resolved notification payload prepared by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub recipient_type: RecipientType,
    /// Concrete recipient resolved from the triggering entity.
    pub recipient: String,
}

/// Fully-resolved email payload prepared by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// The persistent entity store (tasks, campaigns, ads). The engine treats it
/// as the sole source of truth and never caches its records.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn fetch_entity(&self, entity_id: &str) -> Result<Value>;

    async fn fetch_metrics(&self, entity_id: &str) -> Result<MetricSnapshot>;

    async fn create_entity(&self, entity: NewEntity) -> Result<String>;

    /// Unconditional single-field write, for fields that do not race.
    async fn update_field(&self, entity_id: &str, path: &str, value: Value) -> Result<()>;

    /// Conditional write: replace `field` only while its stored value still
    /// equals `observed`. Returns `Ok(false)` when another writer got there
    /// first. Budget and status mutations go through this, never through a
    /// blind overwrite.
    async fn compare_and_update(
        &self,
        entity_id: &str,
        field: &str,
        observed: &Value,
        replacement: Value,
    ) -> Result<bool>;

    /// Pick and persist an assignee according to the strategy, returning the
    /// chosen user id.
    async fn assign_user(&self, entity_id: &str, strategy: AssignStrategy) -> Result<String>;
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<()>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

#[async_trait]
pub trait WebhookPoster: Send + Sync {
    async fn post(&self, url: &str, payload: &Value) -> Result<()>;
}

/// Append-only audit table in the external store.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborator fakes shared by the engine tests.

    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::EngineError;

    #[derive(Default)]
    pub struct FakeEntityStore {
        pub entities: Mutex<HashMap<String, Value>>,
        pub metrics: Mutex<HashMap<String, MetricSnapshot>>,
        pub created: Mutex<Vec<NewEntity>>,
        /// When set, every call fails as if the store were unreachable.
        pub unreachable: Mutex<bool>,
        /// Number of compare_and_update calls observed, conflicts included.
        pub cas_attempts: Mutex<u32>,
    }

    impl FakeEntityStore {
        pub fn with_entity(id: &str, entity: Value) -> Self {
            let store = Self::default();
            store.entities.lock().insert(id.to_string(), entity);
            store
        }

        pub fn budget_of(&self, id: &str) -> Option<f64> {
            self.entities
                .lock()
                .get(id)
                .and_then(|entity| entity.get("budget"))
                .and_then(Value::as_f64)
        }

        fn check_reachable(&self) -> Result<()> {
            if *self.unreachable.lock() {
                Err(EngineError::Store("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl EntityStore for FakeEntityStore {
        async fn fetch_entity(&self, entity_id: &str) -> Result<Value> {
            self.check_reachable()?;
            self.entities
                .lock()
                .get(entity_id)
                .cloned()
                .ok_or_else(|| EngineError::EntityNotFound(entity_id.to_string()))
        }

        async fn fetch_metrics(&self, entity_id: &str) -> Result<MetricSnapshot> {
            self.check_reachable()?;
            self.metrics
                .lock()
                .get(entity_id)
                .copied()
                .ok_or_else(|| EngineError::EntityNotFound(entity_id.to_string()))
        }

        async fn create_entity(&self, entity: NewEntity) -> Result<String> {
            self.check_reachable()?;
            self.created.lock().push(entity);
            Ok(format!("entity-{}", self.created.lock().len()))
        }

        async fn update_field(&self, entity_id: &str, path: &str, value: Value) -> Result<()> {
            self.check_reachable()?;
            let mut entities = self.entities.lock();
            let entity = entities
                .get_mut(entity_id)
                .ok_or_else(|| EngineError::EntityNotFound(entity_id.to_string()))?;
            if let Value::Object(map) = entity {
                map.insert(path.to_string(), value);
            }
            Ok(())
        }

        async fn compare_and_update(
            &self,
            entity_id: &str,
            field: &str,
            observed: &Value,
            replacement: Value,
        ) -> Result<bool> {
            self.check_reachable()?;
            *self.cas_attempts.lock() += 1;
            let mut entities = self.entities.lock();
            let entity = entities
                .get_mut(entity_id)
                .ok_or_else(|| EngineError::EntityNotFound(entity_id.to_string()))?;
            let current = entity.get(field).cloned().unwrap_or(Value::Null);
            let matches = match (current.as_f64(), observed.as_f64()) {
                (Some(lhs), Some(rhs)) => (lhs - rhs).abs() < f64::EPSILON,
                _ => &current == observed,
            };
            if !matches {
                return Ok(false);
            }
            if let Value::Object(map) = entity {
                map.insert(field.to_string(), replacement);
            }
            Ok(true)
        }

        async fn assign_user(&self, _entity_id: &str, _strategy: AssignStrategy) -> Result<String> {
            self.check_reachable()?;
            Ok("user-assigned".to_string())
        }
    }

    #[derive(Default)]
    pub struct FakeDelivery {
        pub notifications: Mutex<Vec<Notification>>,
        pub emails: Mutex<Vec<Email>>,
        pub webhooks: Mutex<Vec<(String, Value)>>,
        /// When set, webhook posts fail as if the endpoint were unreachable.
        pub webhook_down: Mutex<bool>,
    }

    #[async_trait]
    impl NotificationSender for FakeDelivery {
        async fn send(&self, notification: Notification) -> Result<()> {
            self.notifications.lock().push(notification);
            Ok(())
        }
    }

    #[async_trait]
    impl EmailSender for FakeDelivery {
        async fn send(&self, email: Email) -> Result<()> {
            self.emails.lock().push(email);
            Ok(())
        }
    }

    #[async_trait]
    impl WebhookPoster for FakeDelivery {
        async fn post(&self, url: &str, payload: &Value) -> Result<()> {
            if *self.webhook_down.lock() {
                return Err(EngineError::Store(format!("webhook {url} unreachable")));
            }
            self.webhooks.lock().push((url.to_string(), payload.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeAuditSink {
        pub records: Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl AuditSink for FakeAuditSink {
        async fn append(&self, record: &AuditRecord) -> Result<()> {
            self.records.lock().push(record.clone());
            Ok(())
        }
    }
}
