// crates/command-gate-core/src/runtime/registry.rs
// ============================================================================
// Module: Command Registry
// Description: Id-keyed store of command descriptors.
// Purpose: Validate and hold the commands the dispatch engine can run.
// Dependencies: crate::interfaces, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Descriptors are immutable once registered. Registering an id that already
//! exists replaces the previous descriptor (last write wins) and reports
//! `replaced: true`. The registry is owned by one engine instance; there is
//! no process-wide default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::MutationScope;
use crate::interfaces::CommandExecutor;
use crate::interfaces::PayloadValidator;

// ============================================================================
// SECTION: Descriptor
// ============================================================================

/// Registered command definition.
#[derive(Clone)]
pub struct CommandDescriptor {
    /// Unique command id.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Declared mutation scope.
    pub mutation_scope: MutationScope,
    /// Whether student callers must go through approval.
    pub requires_approval: bool,
    /// Audit classification tag.
    pub audit_tag: String,
    /// Declarative payload schema, for introspection only.
    pub schema: Value,
    /// Payload validator.
    pub validator: Arc<dyn PayloadValidator>,
    /// Command body.
    pub executor: Arc<dyn CommandExecutor>,
}

impl CommandDescriptor {
    /// Builds a descriptor with the audit tag defaulting to the id, an open
    /// object schema, and no approval requirement.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        mutation_scope: MutationScope,
        validator: Arc<dyn PayloadValidator>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let id = id.into();
        Self {
            audit_tag: id.clone(),
            id,
            description: description.into(),
            mutation_scope,
            requires_approval: false,
            schema: json!({"type": "object"}),
            validator,
            executor,
        }
    }

    /// Sets the approval requirement.
    #[must_use]
    pub const fn with_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Sets the audit tag.
    #[must_use]
    pub fn with_audit_tag(mut self, audit_tag: impl Into<String>) -> Self {
        self.audit_tag = audit_tag.into();
        self
    }

    /// Sets the introspection schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Returns the introspection record published in tool catalogs.
    #[must_use]
    pub fn introspect(&self) -> Value {
        let mut record = Map::new();
        record.insert("commandId".to_string(), Value::String(self.id.clone()));
        record.insert("description".to_string(), Value::String(self.description.clone()));
        record.insert(
            "mutationScope".to_string(),
            Value::String(self.mutation_scope.as_str().to_string()),
        );
        record.insert("requiresApproval".to_string(), Value::Bool(self.requires_approval));
        record.insert("auditTag".to_string(), Value::String(self.audit_tag.clone()));
        record.insert("schema".to_string(), self.schema.clone());
        Value::Object(record)
    }

    /// Trims string fields and checks descriptor shape.
    fn normalized(mut self) -> Result<Self, RegistryError> {
        self.id = self.id.trim().to_string();
        if self.id.is_empty() {
            return Err(RegistryError::InvalidId);
        }
        self.description = self.description.trim().to_string();
        if self.description.is_empty() {
            return Err(RegistryError::InvalidDescription(self.id));
        }
        self.audit_tag = self.audit_tag.trim().to_string();
        if self.audit_tag.is_empty() {
            return Err(RegistryError::InvalidAuditTag(self.id));
        }
        if !self.schema.is_object() {
            return Err(RegistryError::InvalidSchema(self.id));
        }
        Ok(self)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("mutation_scope", &self.mutation_scope)
            .field("requires_approval", &self.requires_approval)
            .field("audit_tag", &self.audit_tag)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Descriptor rejected at registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Id missing or blank.
    #[error("command id must be non-empty")]
    InvalidId,
    /// Description missing or blank.
    #[error("command {0}: description must be non-empty")]
    InvalidDescription(String),
    /// Audit tag missing or blank.
    #[error("command {0}: audit tag must be non-empty")]
    InvalidAuditTag(String),
    /// Schema is not an object descriptor.
    #[error("command {0}: schema must be an object")]
    InvalidSchema(String),
}

impl RegistryError {
    /// Returns the stable label for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidId => "invalid-command-id",
            Self::InvalidDescription(_) => "invalid-command-description",
            Self::InvalidAuditTag(_) => "invalid-command-audit-tag",
            Self::InvalidSchema(_) => "invalid-command-schema",
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// True when an existing descriptor with the same id was replaced.
    pub replaced: bool,
}

/// Id-keyed command store.
///
/// # Invariants
/// - At most one descriptor per id at any instant.
/// - Stored ids, descriptions, and audit tags are trimmed and non-empty.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    /// Descriptors keyed by id.
    commands: RwLock<BTreeMap<String, Arc<CommandDescriptor>>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the descriptor shape is invalid; the
    /// registry is left unchanged.
    pub fn register(&self, descriptor: CommandDescriptor) -> Result<Registration, RegistryError> {
        let descriptor = descriptor.normalized()?;
        let mut commands = self.commands.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = commands.insert(descriptor.id.clone(), Arc::new(descriptor)).is_some();
        drop(commands);
        Ok(Registration {
            replaced,
        })
    }

    /// Removes a descriptor, returning true when one existed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut commands = self.commands.write().unwrap_or_else(PoisonError::into_inner);
        commands.remove(id.trim()).is_some()
    }

    /// Looks up a descriptor by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<CommandDescriptor>> {
        let commands = self.commands.read().unwrap_or_else(PoisonError::into_inner);
        commands.get(id.trim()).cloned()
    }

    /// Returns true when the id is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        let commands = self.commands.read().unwrap_or_else(PoisonError::into_inner);
        commands.contains_key(id.trim())
    }

    /// Returns the number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns introspection records for every command, ordered by id.
    #[must_use]
    pub fn catalog(&self) -> Vec<Value> {
        let commands = self.commands.read().unwrap_or_else(PoisonError::into_inner);
        commands.values().map(|descriptor| descriptor.introspect()).collect()
    }

    /// Removes every descriptor.
    pub fn clear(&self) {
        self.commands.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
