//! Marketing automation and optimization rule engine for the AdPilot
//! platform.
//!
//! The crate implements a generic trigger → condition → action pipeline used
//! for workflow automation, a metric-threshold evaluator used for ad
//! optimization, and an advisory layer that proposes machine-generated
//! recommendations without applying them. Rules are expressed as JSON/YAML
//! documents defining a trigger, an ANDed condition list and templated
//! actions; every firing is recorded through the execution auditor.
//!
//! The engine owns no threads, timers or external clients: the entity store,
//! the delivery subsystems and the audit table are injected behind narrow
//! traits, and every dispatch call is an independent, re-entrant unit of
//! work.

mod action;
mod advisor;
mod audit;
mod collab;
mod condition;
mod context;
mod dispatch;
mod error;
mod handler;
mod loader;
mod metrics;
mod rule;
mod service;
mod store;
mod template;
pub mod templates;
mod trigger;

pub use action::{Action, AssignStrategy, BudgetDirection, RecipientType};
pub use advisor::{generate, Advisor, AdvisorThresholds, Recommendation, RecommendationKind};
pub use audit::{AuditRecord, Auditor};
pub use collab::{
    AuditSink, Email, EmailSender, EntityStore, NewEntity, Notification, NotificationSender,
    WebhookPoster,
};
pub use condition::{evaluate_all, CompareOp, Condition, FLOAT_TOLERANCE};
pub use context::{Context, FieldPath, TriggerEvent};
pub use dispatch::TriggerDispatcher;
pub use error::{EngineError, Result};
pub use handler::{ActionHandler, ActionResult, Collaborators, HandlerRegistry};
pub use loader::{load_rules, LoadedRules};
pub use metrics::{evaluate_threshold, MetricName, MetricSnapshot};
pub use rule::Rule;
pub use service::{EngineApiBuilder, EngineServiceConfig, RuleDocument, TriggerRequest};
pub use store::{DeadLetter, RuleStore, StoredRule};
pub use template::{render_value, resolve, resolve_value};
pub use trigger::{TriggerKind, TriggerSpec};
