// crates/command-gate-core/src/runtime/outcome.rs
// ============================================================================
// Module: Dispatch Outcomes
// Description: Result values returned by the dispatch engine.
// Purpose: Represent every dispatch failure as a typed value, never a panic.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`DispatchResult`] is what [`crate::CommandBus::dispatch`] returns for
//! every call. Failures carry a [`DispatchErrorCode`] whose label is the
//! stable wire code; executor panics and hook failures land here too.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable failure codes produced by the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchErrorCode {
    /// Command id empty or unregistered.
    UnknownCommand,
    /// Validator rejected the payload (or panicked).
    InvalidPayload,
    /// Student attempt at an approval-gated command.
    ApprovalRequired,
    /// Approval-gated attempt with no approval queue installed.
    ApprovalPolicyMissing,
    /// Approval queue returned an error or panicked.
    ApprovalQueueFailed,
    /// Executor returned an error or panicked.
    CommandExecutionFailed,
}

impl DispatchErrorCode {
    /// Returns the stable label for this code.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UnknownCommand => "unknown-command",
            Self::InvalidPayload => "invalid-payload",
            Self::ApprovalRequired => "approval-required",
            Self::ApprovalPolicyMissing => "approval-policy-missing",
            Self::ApprovalQueueFailed => "approval-queue-failed",
            Self::CommandExecutionFailed => "command-execution-failed",
        }
    }
}

impl fmt::Display for DispatchErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Typed dispatch failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    /// Failure code.
    pub code: DispatchErrorCode,
    /// Human-readable detail.
    pub message: String,
    /// Optional sanitized structured detail.
    pub details: Option<Value>,
}

impl DispatchFailure {
    /// Builds a failure without details.
    #[must_use]
    pub fn new(code: DispatchErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Executed result or typed failure.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Executor completed successfully.
    Executed {
        /// Executor result.
        result: Value,
    },
    /// Pipeline short-circuited or the executor failed.
    Failed(DispatchFailure),
}

/// Result of one dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    /// Command id as requested (trimmed).
    pub command_id: String,
    /// Correlation id linking the audit events of the originating call.
    pub correlation_id: String,
    /// True when replayed from the idempotency cache.
    pub deduped: bool,
    /// Outcome of the call.
    pub outcome: DispatchOutcome,
}

impl DispatchResult {
    /// Returns true when the command executed successfully.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Executed { .. })
    }

    /// Returns the executor result for successful dispatches.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            DispatchOutcome::Executed {
                result,
            } => Some(result),
            DispatchOutcome::Failed(_) => None,
        }
    }

    /// Returns the failure for unsuccessful dispatches.
    #[must_use]
    pub const fn failure(&self) -> Option<&DispatchFailure> {
        match &self.outcome {
            DispatchOutcome::Failed(failure) => Some(failure),
            DispatchOutcome::Executed {
                ..
            } => None,
        }
    }

    /// Returns the outcome code (`executed` or a failure label).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match &self.outcome {
            DispatchOutcome::Executed {
                ..
            } => "executed",
            DispatchOutcome::Failed(failure) => failure.code.label(),
        }
    }

    /// Returns a copy marked as replayed.
    #[must_use]
    pub fn replayed(&self) -> Self {
        Self {
            deduped: true,
            ..self.clone()
        }
    }

    /// Renders the result as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut record = Map::new();
        record.insert("ok".to_string(), Value::Bool(self.is_ok()));
        record.insert("code".to_string(), Value::String(self.code().to_string()));
        record.insert("commandId".to_string(), Value::String(self.command_id.clone()));
        record.insert("correlationId".to_string(), Value::String(self.correlation_id.clone()));
        record.insert("deduped".to_string(), Value::Bool(self.deduped));
        match &self.outcome {
            DispatchOutcome::Executed {
                result,
            } => {
                record.insert("result".to_string(), result.clone());
            }
            DispatchOutcome::Failed(failure) => {
                record.insert("message".to_string(), Value::String(failure.message.clone()));
                if let Some(details) = &failure.details {
                    record.insert("details".to_string(), details.clone());
                }
            }
        }
        Value::Object(record)
    }
}
