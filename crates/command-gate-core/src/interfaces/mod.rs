// crates/command-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Command Gate Interfaces
// Description: Caller-supplied hooks consumed by the dispatch engine.
// Purpose: Define the contract surfaces for validators, executors, and approval policy.
// Dependencies: async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The dispatch engine never decides what a command does. Command bodies,
//! payload validation, approval queueing, and role resolution are all
//! supplied by callers through the traits in this module and injected at
//! construction time. Every call into these traits is isolated by the engine:
//! an `Err` or a panic becomes a structured dispatch failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::MutationScope;
use crate::core::Role;

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Per-dispatch context handed to an executor. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Effective caller role.
    pub role: Role,
    /// Command being executed.
    pub command_id: String,
    /// Audit tag declared by the command.
    pub audit_tag: String,
    /// Mutation scope declared by the command.
    pub mutation_scope: MutationScope,
    /// Caller metadata.
    pub meta: Map<String, Value>,
    /// Idempotency key, when the caller opted in.
    pub idempotency_key: Option<String>,
    /// Idempotency TTL applied to this dispatch.
    pub idempotency_ttl_ms: u64,
    /// Correlation id linking this dispatch's audit events.
    pub correlation_id: String,
}

// ============================================================================
// SECTION: Payload Validation
// ============================================================================

/// Payload rejected by a command validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PayloadError {
    /// Human-readable reason.
    pub message: String,
    /// Optional dotted path of the offending field.
    pub path: Option<String>,
}

impl PayloadError {
    /// Builds an error without a field path.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Builds an error for a specific field.
    #[must_use]
    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

/// Pure payload validator: raw payload in, validated payload out.
pub trait PayloadValidator: Send + Sync {
    /// Validates (and optionally normalizes) a raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the payload is unacceptable.
    fn validate(&self, payload: &Value) -> Result<Value, PayloadError>;
}

impl<F> PayloadValidator for F
where
    F: Fn(&Value) -> Result<Value, PayloadError> + Send + Sync,
{
    fn validate(&self, payload: &Value) -> Result<Value, PayloadError> {
        self(payload)
    }
}

/// Pins the closure signature so argument types infer at the call site.
pub const fn validator_fn<F>(validator: F) -> F
where
    F: Fn(&Value) -> Result<Value, PayloadError> + Send + Sync,
{
    validator
}

/// Validator that accepts any JSON object unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectPayload;

impl PayloadValidator for ObjectPayload {
    fn validate(&self, payload: &Value) -> Result<Value, PayloadError> {
        if payload.is_object() {
            Ok(payload.clone())
        } else {
            Err(PayloadError::new("payload must be an object"))
        }
    }
}

// ============================================================================
// SECTION: Command Execution
// ============================================================================

/// Failure reported by a command executor.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CommandError {
    /// Human-readable reason.
    pub message: String,
    /// Optional structured detail (sanitized before it leaves the engine).
    pub details: Option<Value>,
}

impl CommandError {
    /// Builds an error with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

/// Opaque command body.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Executes the command with a validated payload.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when execution fails.
    async fn execute(&self, payload: Value, ctx: ExecutionContext) -> Result<Value, CommandError>;
}

/// Executor backed by an async closure.
pub struct FnExecutor<F> {
    /// Wrapped closure.
    handler: F,
}

/// Wraps an async closure as a [`CommandExecutor`].
pub const fn executor_fn<F, Fut>(handler: F) -> FnExecutor<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CommandError>> + Send,
{
    FnExecutor {
        handler,
    }
}

#[async_trait]
impl<F, Fut> CommandExecutor for FnExecutor<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CommandError>> + Send,
{
    async fn execute(&self, payload: Value, ctx: ExecutionContext) -> Result<Value, CommandError> {
        (self.handler)(payload, ctx).await
    }
}

// ============================================================================
// SECTION: Approval Policy
// ============================================================================

/// Command attempt held for approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApprovalEntry {
    /// Command that was attempted.
    pub command_id: String,
    /// Validated payload.
    pub payload: Value,
    /// Declared mutation scope.
    pub mutation_scope: MutationScope,
    /// Declared audit tag.
    pub audit_tag: String,
    /// Idempotency key of the attempt, if any.
    pub idempotency_key: Option<String>,
    /// Caller metadata.
    pub meta: Map<String, Value>,
    /// Role that attempted the command.
    pub requested_by: Role,
    /// Correlation id of the attempt.
    pub correlation_id: String,
}

/// Approval queue rejected an entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("approval queue error: {0}")]
pub struct ApprovalQueueError(pub String);

/// External approval queue for student-gated commands.
pub trait ApprovalQueue: Send + Sync {
    /// Hands an entry to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalQueueError`] when the entry could not be queued.
    fn enqueue_pending_command(&self, entry: PendingApprovalEntry) -> Result<(), ApprovalQueueError>;

    /// Returns false to skip queueing this entry. Defaults to true.
    fn should_queue(&self, _entry: &PendingApprovalEntry) -> bool {
        true
    }
}

/// Source of the ambient caller role when a dispatch names none.
pub trait RoleProvider: Send + Sync {
    /// Returns the current role, if known.
    fn current_role(&self) -> Option<Role>;
}

/// Role provider that always reports one role.
#[derive(Debug, Clone, Copy)]
pub struct FixedRole(pub Role);

impl RoleProvider for FixedRole {
    fn current_role(&self) -> Option<Role> {
        Some(self.0)
    }
}
