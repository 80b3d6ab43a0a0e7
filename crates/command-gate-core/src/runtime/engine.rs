// crates/command-gate-core/src/runtime/engine.rs
// ============================================================================
// Module: Command Dispatch Engine
// Description: Validate, deduplicate, gate, execute, and audit commands.
// Purpose: Provide the single entry point through which commands run.
// Dependencies: crate::{audit, core, interfaces, runtime}, futures-util, serde_json
// ============================================================================

//! ## Overview
//! [`CommandBus::dispatch`] runs a fixed pipeline:
//!
//! 1. prune expired idempotency entries;
//! 2. resolve the effective role (explicit, then the role provider, then host);
//! 3. derive the correlation id (the idempotency key, else a generated id);
//! 4. replay a live cached result for `(command, role, key)` with `deduped`;
//! 5. resolve the command (`unknown-command`);
//! 6. validate the payload (`invalid-payload`);
//! 7. gate student attempts at approval-gated commands (`approval-required`);
//! 8. execute (`command-execution-failed` on error or panic);
//! 9. cache the outcome when a key was supplied.
//!
//! Every stage emits a [`CommandAuditEvent`]. Every hook call is isolated,
//! so a hook error or panic becomes a typed [`DispatchFailure`] and never
//! escapes the call.
//!
//! Keyed dispatches share an in-flight cell, so concurrent duplicates await
//! one execution and observe its result with `deduped: true`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::audit::AuditEventType;
use crate::audit::CommandAuditEvent;
use crate::audit::CommandAuditSink;
use crate::audit::NoopCommandAuditSink;
use crate::core::CorrelationIdGenerator;
use crate::core::Role;
use crate::core::SharedClock;
use crate::core::identifiers::normalize_optional;
use crate::core::json_safety::sanitize;
use crate::core::time::system_clock;
use crate::interfaces::ApprovalQueue;
use crate::interfaces::ExecutionContext;
use crate::interfaces::PendingApprovalEntry;
use crate::interfaces::RoleProvider;
use crate::runtime::idempotency::CacheKey;
use crate::runtime::idempotency::Claim;
use crate::runtime::idempotency::DEFAULT_IDEMPOTENCY_TTL_MS;
use crate::runtime::idempotency::DEFAULT_MAX_IDEMPOTENCY_ENTRIES;
use crate::runtime::idempotency::IdempotencyCache;
use crate::runtime::idempotency::resolve_ttl;
use crate::runtime::outcome::DispatchErrorCode;
use crate::runtime::outcome::DispatchFailure;
use crate::runtime::outcome::DispatchOutcome;
use crate::runtime::outcome::DispatchResult;
use crate::runtime::registry::CommandDescriptor;
use crate::runtime::registry::CommandRegistry;
use crate::runtime::registry::Registration;
use crate::runtime::registry::RegistryError;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Per-call dispatch options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOptions {
    /// Explicit caller role.
    pub role: Option<Role>,
    /// Caller metadata forwarded to the executor and audit.
    pub meta: Map<String, Value>,
    /// Opt-in idempotency key.
    pub idempotency_key: Option<String>,
    /// Replay window override in milliseconds.
    pub idempotency_ttl_ms: Option<u64>,
}

impl DispatchOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the caller role.
    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Sets caller metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Sets the replay window.
    #[must_use]
    pub const fn with_idempotency_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.idempotency_ttl_ms = Some(ttl_ms);
        self
    }
}

/// Normalized inputs of one dispatch call.
struct Attempt {
    /// Trimmed command id.
    command_id: String,
    /// Effective role.
    role: Role,
    /// Correlation id for audit events.
    correlation_id: String,
    /// Raw caller metadata.
    meta: Map<String, Value>,
    /// Sanitized metadata for audit events.
    audit_metadata: Value,
    /// Normalized idempotency key.
    idempotency_key: Option<String>,
    /// Effective replay window.
    ttl_ms: u64,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`CommandBus`].
pub struct CommandBusBuilder {
    /// Command registry.
    registry: Option<Arc<CommandRegistry>>,
    /// Time source.
    clock: Option<SharedClock>,
    /// Approval queue hook.
    approval_queue: Option<Arc<dyn ApprovalQueue>>,
    /// Ambient role hook.
    role_provider: Option<Arc<dyn RoleProvider>>,
    /// Audit sink.
    audit_sink: Option<Arc<dyn CommandAuditSink>>,
    /// Default replay window.
    idempotency_ttl_ms: u64,
    /// Tracked idempotency key bound.
    max_idempotency_entries: usize,
}

impl CommandBusBuilder {
    /// Uses an existing registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses the given clock instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Installs the approval queue hook.
    #[must_use]
    pub fn approval_queue(mut self, queue: Arc<dyn ApprovalQueue>) -> Self {
        self.approval_queue = Some(queue);
        self
    }

    /// Installs the ambient role hook.
    #[must_use]
    pub fn role_provider(mut self, provider: Arc<dyn RoleProvider>) -> Self {
        self.role_provider = Some(provider);
        self
    }

    /// Installs the audit sink.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn CommandAuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Sets the default replay window (zero keeps the built-in default).
    #[must_use]
    pub fn idempotency_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.idempotency_ttl_ms = resolve_ttl(Some(ttl_ms), DEFAULT_IDEMPOTENCY_TTL_MS);
        self
    }

    /// Sets the bound on tracked idempotency keys.
    #[must_use]
    pub fn max_idempotency_entries(mut self, max_entries: usize) -> Self {
        self.max_idempotency_entries = max_entries;
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> CommandBus {
        CommandBus {
            registry: self.registry.unwrap_or_default(),
            cache: IdempotencyCache::with_max_entries(self.max_idempotency_entries),
            clock: self.clock.unwrap_or_else(system_clock),
            approval_queue: self.approval_queue,
            role_provider: self.role_provider,
            audit_sink: self.audit_sink.unwrap_or_else(|| Arc::new(NoopCommandAuditSink)),
            default_ttl_ms: self.idempotency_ttl_ms,
            correlation: CorrelationIdGenerator::new("dispatch"),
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Command registry plus dispatch pipeline.
pub struct CommandBus {
    /// Registered commands.
    registry: Arc<CommandRegistry>,
    /// Keyed replay cache.
    cache: IdempotencyCache,
    /// Time source.
    clock: SharedClock,
    /// Approval queue hook.
    approval_queue: Option<Arc<dyn ApprovalQueue>>,
    /// Ambient role hook.
    role_provider: Option<Arc<dyn RoleProvider>>,
    /// Audit sink.
    audit_sink: Arc<dyn CommandAuditSink>,
    /// Default replay window.
    default_ttl_ms: u64,
    /// Generator for unkeyed correlation ids.
    correlation: CorrelationIdGenerator,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CommandBus {
    /// Starts a builder with system defaults.
    #[must_use]
    pub fn builder() -> CommandBusBuilder {
        CommandBusBuilder {
            registry: None,
            clock: None,
            approval_queue: None,
            role_provider: None,
            audit_sink: None,
            idempotency_ttl_ms: DEFAULT_IDEMPOTENCY_TTL_MS,
            max_idempotency_entries: DEFAULT_MAX_IDEMPOTENCY_ENTRIES,
        }
    }

    /// Returns the command registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Registers a command.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the descriptor shape is invalid.
    pub fn register(&self, descriptor: CommandDescriptor) -> Result<Registration, RegistryError> {
        self.registry.register(descriptor)
    }

    /// Returns the default replay window.
    #[must_use]
    pub const fn default_idempotency_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    /// Returns the number of idempotency keys currently tracked.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Returns the bound on tracked idempotency keys.
    #[must_use]
    pub const fn max_idempotency_entries(&self) -> usize {
        self.cache.max_entries()
    }

    /// Dispatches a command through the full pipeline.
    pub async fn dispatch(
        &self,
        command_id: &str,
        payload: Value,
        options: DispatchOptions,
    ) -> DispatchResult {
        let now_ms = self.clock.now_ms();
        self.cache.prune(now_ms);
        let role = self.resolve_role(options.role);
        let idempotency_key = normalize_optional(options.idempotency_key.as_deref());
        let correlation_id = idempotency_key.clone().unwrap_or_else(|| self.correlation.issue());
        let audit_metadata = sanitize(&Value::Object(options.meta.clone()), "meta").into_value_or_null();
        let attempt = Attempt {
            command_id: command_id.trim().to_string(),
            role,
            correlation_id,
            meta: options.meta,
            audit_metadata,
            idempotency_key,
            ttl_ms: resolve_ttl(options.idempotency_ttl_ms, self.default_ttl_ms),
        };
        self.emit(&attempt, AuditEventType::DispatchRequest, None, None);

        let Some(key) = attempt.idempotency_key.clone() else {
            return self.run(&attempt, payload).await;
        };
        let cache_key = CacheKey {
            command_id: attempt.command_id.clone(),
            role: attempt.role,
            key,
        };
        let cell = match self.cache.claim(&cache_key, now_ms) {
            Claim::Replay(result) => return result,
            Claim::Cell(cell) => cell,
        };
        let mut led = false;
        let result = cell
            .get_or_init(|| {
                led = true;
                self.run(&attempt, payload)
            })
            .await
            .clone();
        if led {
            let expires_at = self.clock.now_ms().saturating_add(attempt.ttl_ms);
            self.cache.complete(cache_key, result.clone(), expires_at);
            result
        } else {
            result.replayed()
        }
    }

    /// Resolves the effective role for a call.
    fn resolve_role(&self, explicit: Option<Role>) -> Role {
        if let Some(role) = explicit {
            return role;
        }
        self.role_provider
            .as_ref()
            .and_then(|provider| catch_unwind(AssertUnwindSafe(|| provider.current_role())).ok().flatten())
            .unwrap_or_default()
    }

    /// Runs pipeline stages 5 through 8.
    async fn run(&self, attempt: &Attempt, payload: Value) -> DispatchResult {
        let resolved = if attempt.command_id.is_empty() {
            None
        } else {
            self.registry.get(&attempt.command_id)
        };
        let Some(resolved) = resolved else {
            let message = if attempt.command_id.is_empty() {
                "command id must be non-empty".to_string()
            } else {
                format!("unknown command '{}'", attempt.command_id)
            };
            self.emit(attempt, AuditEventType::DispatchInvalidCommand, None, Some(message.clone()));
            return failed(attempt, DispatchFailure::new(DispatchErrorCode::UnknownCommand, message));
        };
        let descriptor: &CommandDescriptor = &resolved;

        let validated = match catch_unwind(AssertUnwindSafe(|| descriptor.validator.validate(&payload))) {
            Ok(Ok(validated)) => validated,
            Ok(Err(err)) => {
                let mut details = json!({"reason": "validator-rejected"});
                if let (Some(path), Some(record)) = (err.path.clone(), details.as_object_mut()) {
                    record.insert("path".to_string(), Value::String(path));
                }
                return self.reject_payload(attempt, descriptor, err.message, details);
            }
            Err(_) => {
                return self.reject_payload(
                    attempt,
                    descriptor,
                    "payload validator panicked".to_string(),
                    json!({"reason": "validator-threw"}),
                );
            }
        };

        if attempt.role == Role::Student && descriptor.requires_approval {
            return self.gate_for_approval(attempt, descriptor, validated);
        }

        let ctx = ExecutionContext {
            role: attempt.role,
            command_id: descriptor.id.clone(),
            audit_tag: descriptor.audit_tag.clone(),
            mutation_scope: descriptor.mutation_scope,
            meta: attempt.meta.clone(),
            idempotency_key: attempt.idempotency_key.clone(),
            idempotency_ttl_ms: attempt.ttl_ms,
            correlation_id: attempt.correlation_id.clone(),
        };
        let executed = AssertUnwindSafe(descriptor.executor.execute(validated, ctx)).catch_unwind().await;
        match executed {
            Ok(Ok(result)) => {
                self.emit(attempt, AuditEventType::DispatchExecuted, Some(descriptor), None);
                DispatchResult {
                    command_id: attempt.command_id.clone(),
                    correlation_id: attempt.correlation_id.clone(),
                    deduped: false,
                    outcome: DispatchOutcome::Executed {
                        result,
                    },
                }
            }
            Ok(Err(err)) => {
                self.emit(
                    attempt,
                    AuditEventType::DispatchExecutionFailed,
                    Some(descriptor),
                    Some(err.message.clone()),
                );
                let mut failure =
                    DispatchFailure::new(DispatchErrorCode::CommandExecutionFailed, err.message);
                if let Some(details) = err.details {
                    failure = failure.with_details(sanitize(&details, "details").into_value_or_null());
                }
                failed(attempt, failure)
            }
            Err(_) => {
                let message = format!("command '{}' panicked during execution", descriptor.id);
                self.emit(
                    attempt,
                    AuditEventType::DispatchExecutionFailed,
                    Some(descriptor),
                    Some(message.clone()),
                );
                failed(attempt, DispatchFailure::new(DispatchErrorCode::CommandExecutionFailed, message))
            }
        }
    }

    /// Records and returns an `invalid-payload` failure.
    fn reject_payload(
        &self,
        attempt: &Attempt,
        descriptor: &CommandDescriptor,
        message: String,
        details: Value,
    ) -> DispatchResult {
        self.emit(attempt, AuditEventType::DispatchInvalidPayload, Some(descriptor), Some(message.clone()));
        failed(
            attempt,
            DispatchFailure::new(DispatchErrorCode::InvalidPayload, message).with_details(details),
        )
    }

    /// Hands a student attempt to the approval queue; never executes it.
    fn gate_for_approval(
        &self,
        attempt: &Attempt,
        descriptor: &CommandDescriptor,
        validated: Value,
    ) -> DispatchResult {
        let Some(queue) = &self.approval_queue else {
            let message = format!("command '{}' requires approval but no approval queue is installed", descriptor.id);
            self.emit(attempt, AuditEventType::DispatchApprovalRequired, Some(descriptor), Some(message.clone()));
            return failed(attempt, DispatchFailure::new(DispatchErrorCode::ApprovalPolicyMissing, message));
        };
        let entry = PendingApprovalEntry {
            command_id: descriptor.id.clone(),
            payload: validated,
            mutation_scope: descriptor.mutation_scope,
            audit_tag: descriptor.audit_tag.clone(),
            idempotency_key: attempt.idempotency_key.clone(),
            meta: attempt.meta.clone(),
            requested_by: attempt.role,
            correlation_id: attempt.correlation_id.clone(),
        };
        let queued = catch_unwind(AssertUnwindSafe(|| {
            if queue.should_queue(&entry) {
                queue.enqueue_pending_command(entry).map(|()| true)
            } else {
                Ok(false)
            }
        }));
        let queued = match queued {
            Ok(Ok(queued)) => queued,
            Ok(Err(err)) => return self.queue_failed(attempt, descriptor, err.to_string()),
            Err(_) => return self.queue_failed(attempt, descriptor, "approval queue panicked".to_string()),
        };
        if queued {
            self.emit(attempt, AuditEventType::DispatchQueuedForApproval, Some(descriptor), None);
        }
        let message = format!("command '{}' requires approval for role '{}'", descriptor.id, attempt.role);
        self.emit(attempt, AuditEventType::DispatchApprovalRequired, Some(descriptor), None);
        failed(
            attempt,
            DispatchFailure::new(DispatchErrorCode::ApprovalRequired, message)
                .with_details(json!({"queued": queued})),
        )
    }

    /// Records and returns an `approval-queue-failed` failure.
    fn queue_failed(&self, attempt: &Attempt, descriptor: &CommandDescriptor, message: String) -> DispatchResult {
        self.emit(attempt, AuditEventType::DispatchApprovalRequired, Some(descriptor), Some(message.clone()));
        failed(attempt, DispatchFailure::new(DispatchErrorCode::ApprovalQueueFailed, message))
    }

    /// Emits one audit event; sink panics are swallowed.
    fn emit(
        &self,
        attempt: &Attempt,
        event_type: AuditEventType,
        descriptor: Option<&CommandDescriptor>,
        error: Option<String>,
    ) {
        let event = CommandAuditEvent {
            event: "command_dispatch",
            event_type,
            timestamp_ms: self.clock.now_ms(),
            correlation_id: attempt.correlation_id.clone(),
            command_id: attempt.command_id.clone(),
            role: attempt.role,
            audit_tag: descriptor.map(|descriptor| descriptor.audit_tag.clone()),
            mutation_scope: descriptor.map(|descriptor| descriptor.mutation_scope),
            metadata: attempt.audit_metadata.clone(),
            error,
        };
        let _ = catch_unwind(AssertUnwindSafe(|| self.audit_sink.record_command(&event)));
    }
}

/// Wraps a failure into a fresh (non-replayed) result.
fn failed(attempt: &Attempt, failure: DispatchFailure) -> DispatchResult {
    DispatchResult {
        command_id: attempt.command_id.clone(),
        correlation_id: attempt.correlation_id.clone(),
        deduped: false,
        outcome: DispatchOutcome::Failed(failure),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
