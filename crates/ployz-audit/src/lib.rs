//! Audit logging for the ployz deploy engine.
//!
//! This crate provides the durable, structured record of what the executor
//! (C6, `ployz-executor`) decided and why, distinct from its in-process
//! best-effort progress channel:
//! - Ownership acquisition/loss
//! - Tier start/completion
//! - Container create/remove/update and spec rewrites
//! - Health check results and rollback
//! - Deploy completion/failure
//!
//! # Features
//!
//! - Structured audit events with consistent schema
//! - Multiple output backends (tracing, in-memory, custom)
//! - Correlation IDs (the deploy id) for request tracing
//!
//! # Example
//!
//! ```rust
//! use ployz_audit::{AuditLogger, DeployAuditEvent, DeployEventKind, TracingBackend};
//! use std::sync::Arc;
//!
//! // Create a logger with tracing backend
//! let logger = AuditLogger::builder()
//!     .with_backend(Arc::new(TracingBackend::new()))
//!     .build();
//!
//! // Log a deploy lifecycle event
//! let event = DeployAuditEvent::new(DeployEventKind::DeployStarted, "prod", "deploy-1", "preflight begun");
//! logger.log(&event).unwrap();
//! ```

mod event;
mod logger;
mod schema;

pub use event::{AuditEvent, DeployAuditEvent, DeployEventKind, EventOutcome, EventSeverity};
pub use logger::{AuditLogger, InMemoryBackend, LoggerBackend, LoggerError, TracingBackend};
pub use schema::{deploy_event_schema, AuditMetadata, EventSchema, FieldDefinition, FieldType, CURRENT_SCHEMA_VERSION};
