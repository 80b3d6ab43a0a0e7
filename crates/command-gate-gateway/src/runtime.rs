// crates/command-gate-gateway/src/runtime.rs
// ============================================================================
// Module: Gateway Runtime
// Description: Session-authenticated protocol terminator over a message channel.
// Purpose: Route init, list_tools, and call_tool messages into the command bus.
// Dependencies: command-gate-core, futures-util, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`GatewayRuntime::handle_message`] is the single entry point for inbound
//! data. Each call prunes expired sessions, classifies the data, enforces
//! the origin allow-list and size bound, routes the method, and frames the
//! reply. Every failure, including a panic anywhere below the handler,
//! becomes an error response; nothing unwinds into the channel.
//!
//! [`GatewayRuntime::start`] subscribes to a [`MessageChannel`] and hands
//! each event to its own task. Events from one source run one at a time in
//! delivery order; a handler suspended in a command or plugin loader never
//! holds up other sources.
//!
//! Security posture: all inbound data is untrusted. Capability tokens are
//! compared in constant time, sessions are bound to origin and source, and
//! audit records carry token fingerprints only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use command_gate_core::CommandBus;
use command_gate_core::DispatchOptions;
use command_gate_core::DispatchOutcome;
use command_gate_core::JsonSafetyLimits;
use command_gate_core::Role;
use command_gate_core::SharedClock;
use command_gate_core::core::time::system_clock;
use command_gate_core::sanitize_with_limits;
use futures_util::FutureExt;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;

use crate::audit::GatewayAuditEvent;
use crate::audit::GatewayAuditSink;
use crate::audit::GatewayOutcome;
use crate::audit::NoopAuditSink;
use crate::catalog::RegistryCatalog;
use crate::catalog::ToolCatalog;
use crate::catalog::normalize_catalog;
use crate::catalog::normalize_slots;
use crate::channel::ChannelError;
use crate::channel::ChannelEvent;
use crate::channel::MessageChannel;
use crate::channel::SourceId;
use crate::channel::Subscription;
use crate::plugin::PluginContext;
use crate::plugin::PluginLoader;
use crate::protocol::DEFAULT_GATEWAY_CHANNEL;
use crate::protocol::GATEWAY_METHODS;
use crate::protocol::GatewayError;
use crate::protocol::GatewayErrorCode;
use crate::protocol::Inbound;
use crate::protocol::InboundMessage;
use crate::protocol::error_response;
use crate::protocol::ok_response;
use crate::protocol::parse_inbound;
use crate::protocol::request_id_label;
use crate::security::constant_time_eq_str;
use crate::security::mint_session_token;
use crate::security::token_fingerprint;
use crate::session::GatewaySession;
use crate::session::SessionStore;
use crate::tools::COMMAND_ROUTE;
use crate::tools::PLUGIN_REGISTER_ROUTE;
use crate::tools::TOOL_ROUTES;
use crate::tools::ToolRoute;
use crate::tools::parse_tool_call;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default session lifetime in milliseconds (5 minutes).
pub const DEFAULT_SESSION_TTL_MS: u64 = 300_000;

/// Default live session bound.
pub const DEFAULT_MAX_SESSIONS: usize = 256;

/// Default inbound message bound in serialized bytes (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Wildcard entry of the origin allow-list.
pub const WILDCARD_ORIGIN: &str = "*";

/// Audit event name for handled messages.
const MESSAGE_EVENT: &str = "gateway_message";

/// Audit event name for session lifecycle changes.
const SESSION_EVENT: &str = "gateway_session";

// ============================================================================
// SECTION: Options
// ============================================================================

/// Gateway runtime settings.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Protocol tag on every message.
    pub channel: String,
    /// Exact origins allowed to talk to the gateway; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Shared secret required by `init`; empty denies every `init`.
    pub capability_token: String,
    /// Session lifetime in milliseconds.
    pub session_ttl_ms: u64,
    /// Live session bound.
    pub max_sessions: usize,
    /// Inbound message bound in serialized bytes.
    pub max_message_bytes: usize,
    /// UI slot names listed by the default catalog.
    pub ui_slots: Vec<String>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            channel: DEFAULT_GATEWAY_CHANNEL.to_string(),
            allowed_origins: Vec::new(),
            capability_token: String::new(),
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            ui_slots: Vec::new(),
        }
    }
}

impl GatewayOptions {
    /// Returns true when `origin` is on the allow-list.
    #[must_use]
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == WILDCARD_ORIGIN || allowed == origin)
    }

    /// Returns true when the allow-list contains the wildcard.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == WILDCARD_ORIGIN)
    }
}

impl fmt::Debug for GatewayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.capability_token.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("GatewayOptions")
            .field("channel", &self.channel)
            .field("allowed_origins", &self.allowed_origins)
            .field("capability_token", &token)
            .field("session_ttl_ms", &self.session_ttl_ms)
            .field("max_sessions", &self.max_sessions)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("ui_slots", &self.ui_slots)
            .finish()
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`GatewayRuntime`].
pub struct GatewayRuntimeBuilder {
    /// Command bus that executes command routes.
    bus: Arc<CommandBus>,
    /// Runtime settings.
    options: GatewayOptions,
    /// Catalog override.
    catalog: Option<Arc<dyn ToolCatalog>>,
    /// Plugin loader, when plugins are supported.
    plugin_loader: Option<Arc<dyn PluginLoader>>,
    /// Clock override.
    clock: Option<SharedClock>,
    /// Audit sink override.
    audit_sink: Option<Arc<dyn GatewayAuditSink>>,
    /// Bounds applied to results before they leave the gateway.
    result_limits: JsonSafetyLimits,
}

impl GatewayRuntimeBuilder {
    /// Replaces the default registry-backed catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Installs a plugin loader.
    #[must_use]
    pub fn plugin_loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.plugin_loader = Some(loader);
        self
    }

    /// Sets the time source.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn GatewayAuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Tightens the bounds applied to command and plugin results.
    ///
    /// A command result whose root falls outside these bounds is reported
    /// as `non-json-safe-command-result`.
    #[must_use]
    pub fn result_limits(mut self, limits: JsonSafetyLimits) -> Self {
        self.result_limits = limits;
        self
    }

    /// Builds the runtime.
    #[must_use]
    pub fn build(self) -> GatewayRuntime {
        let catalog = self.catalog.unwrap_or_else(|| {
            Arc::new(RegistryCatalog::new(Arc::clone(self.bus.registry()), self.options.ui_slots.clone()))
        });
        GatewayRuntime {
            sessions: Mutex::new(SessionStore::new(self.options.max_sessions)),
            bus: self.bus,
            options: self.options,
            catalog,
            plugin_loader: self.plugin_loader,
            clock: self.clock.unwrap_or_else(system_clock),
            audit_sink: self.audit_sink.unwrap_or_else(|| Arc::new(NoopAuditSink)),
            result_limits: self.result_limits,
        }
    }
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Identity of the session behind a handled message, for audit.
#[derive(Default)]
struct Trail {
    /// Session or requested role.
    role: Option<Role>,
    /// Session token fingerprint.
    fingerprint: Option<String>,
}

/// Gateway protocol terminator.
pub struct GatewayRuntime {
    /// Command bus that executes command routes.
    bus: Arc<CommandBus>,
    /// Runtime settings.
    options: GatewayOptions,
    /// `list_tools` content source.
    catalog: Arc<dyn ToolCatalog>,
    /// Plugin loader, when plugins are supported.
    plugin_loader: Option<Arc<dyn PluginLoader>>,
    /// Time source.
    clock: SharedClock,
    /// Audit sink.
    audit_sink: Arc<dyn GatewayAuditSink>,
    /// Live sessions.
    sessions: Mutex<SessionStore>,
    /// Bounds applied to outbound results.
    result_limits: JsonSafetyLimits,
}

impl GatewayRuntime {
    /// Starts a builder over a command bus.
    #[must_use]
    pub fn builder(bus: Arc<CommandBus>, options: GatewayOptions) -> GatewayRuntimeBuilder {
        GatewayRuntimeBuilder {
            bus,
            options,
            catalog: None,
            plugin_loader: None,
            clock: None,
            audit_sink: None,
            result_limits: JsonSafetyLimits::default(),
        }
    }

    /// Returns the runtime settings.
    #[must_use]
    pub const fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Returns the command bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<CommandBus> {
        &self.bus
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Closes a session by token. Returns false when no live session matched.
    pub fn close_session(&self, token: &str) -> bool {
        let closed = self.lock_sessions().close(token);
        let Some(session) = closed else {
            return false;
        };
        self.record_session(&session, GatewayOutcome::Closed, None);
        true
    }

    /// Closes every session.
    pub fn close_all_sessions(&self) {
        self.lock_sessions().clear();
    }

    /// Handles one inbound message and returns the reply, if any.
    ///
    /// Data that is not addressed to this gateway yields `None`.
    pub async fn handle_message(&self, data: &Value, origin: &str, source: &SourceId) -> Option<Value> {
        let now_ms = self.clock.now_ms();
        self.prune_sessions(now_ms);

        let message = match parse_inbound(data, &self.options.channel) {
            Inbound::Ignored => return None,
            Inbound::Malformed {
                id,
                method,
                message,
            } => {
                let error = GatewayError::new(GatewayErrorCode::InvalidRequest, message);
                let trail = Trail::default();
                self.record_message(now_ms, method.as_deref(), origin, &id, Err(&error), &trail);
                return Some(error_response(&self.options.channel, &id, method.as_deref(), &error));
            }
            Inbound::Message(message) => message,
        };

        let mut trail = Trail::default();
        let outcome = if encoded_len(data) > self.options.max_message_bytes {
            Err(GatewayError::new(
                GatewayErrorCode::MessageTooLarge,
                format!("message exceeds {} bytes", self.options.max_message_bytes),
            ))
        } else {
            AssertUnwindSafe(self.route(&message, origin, source, now_ms, &mut trail))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(GatewayError::new(
                        GatewayErrorCode::GatewayRuntimeError,
                        "gateway failed while handling the message",
                    ))
                })
        };

        self.record_message(now_ms, Some(&message.method), origin, &message.id, outcome.as_ref(), &trail);
        Some(match outcome {
            Ok(result) => ok_response(&self.options.channel, &message.id, &message.method, result),
            Err(error) => error_response(&self.options.channel, &message.id, Some(&message.method), &error),
        })
    }

    /// Handles a channel event and sends the reply through its responder.
    pub async fn handle_event(&self, event: ChannelEvent) {
        if let Some(reply) = self.handle_message(&event.data, &event.origin, &event.source).await {
            event.respond(reply);
        }
    }

    /// Subscribes to `channel` and handles events on a background task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] when the subscription fails.
    pub fn start(self: &Arc<Self>, channel: &dyn MessageChannel) -> Result<GatewayHandle, ChannelError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let subscription = channel.subscribe(events_tx)?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let runtime = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut scheduler = EventScheduler::new(runtime);
            let mut open = true;
            loop {
                if !open && scheduler.is_idle() {
                    break;
                }
                tokio::select! {
                    biased;
                    Ok(()) = &mut stop_rx => {
                        scheduler.shutdown().await;
                        break;
                    }
                    Some(done) = scheduler.tasks.join_next() => {
                        if let Ok(source) = done {
                            scheduler.finish(source);
                        }
                    }
                    event = events_rx.recv(), if open => match event {
                        Some(event) => scheduler.accept(event),
                        None => open = false,
                    },
                }
            }
        });
        Ok(GatewayHandle {
            runtime: Arc::clone(self),
            subscription,
            stop: stop_tx,
            task,
        })
    }

    // ------------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------------

    /// Routes an addressed message by method.
    async fn route(
        &self,
        message: &InboundMessage,
        origin: &str,
        source: &SourceId,
        now_ms: u64,
        trail: &mut Trail,
    ) -> Result<Value, GatewayError> {
        if !self.options.allows_origin(origin) {
            return Err(GatewayError::new(
                GatewayErrorCode::OriginDenied,
                format!("origin '{origin}' is not allowed"),
            ));
        }
        match message.method.as_str() {
            "init" => self.init(message, origin, source, now_ms, trail),
            "list_tools" => {
                let session = self.authenticate(message, origin, source, now_ms, trail)?;
                Ok(self.list_tools(&session))
            }
            "call_tool" => {
                let session = self.authenticate(message, origin, source, now_ms, trail)?;
                self.call_tool(message, &session).await
            }
            other => Err(GatewayError::new(
                GatewayErrorCode::UnsupportedMethod,
                format!("unsupported method '{other}'"),
            )),
        }
    }

    /// Establishes a session.
    fn init(
        &self,
        message: &InboundMessage,
        origin: &str,
        source: &SourceId,
        now_ms: u64,
        trail: &mut Trail,
    ) -> Result<Value, GatewayError> {
        if self.options.capability_token.is_empty() {
            return Err(GatewayError::new(
                GatewayErrorCode::CapabilityTokenNotConfigured,
                "gateway has no capability token configured",
            ));
        }
        let Some(supplied) = message.capability_token.as_deref() else {
            return Err(GatewayError::new(GatewayErrorCode::CapabilityTokenMissing, "init requires a capability token"));
        };
        if !constant_time_eq_str(supplied, &self.options.capability_token) {
            return Err(GatewayError::new(GatewayErrorCode::CapabilityTokenInvalid, "capability token is invalid"));
        }
        let role = match &message.role {
            None => Role::Host,
            Some(Value::String(label)) => Role::parse(label).ok_or_else(invalid_role)?,
            Some(_) => return Err(invalid_role()),
        };
        trail.role = Some(role);

        let session = GatewaySession {
            token: mint_session_token(),
            role,
            origin: origin.to_string(),
            source: source.clone(),
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(self.options.session_ttl_ms),
        };
        self.lock_sessions().insert(session.clone())?;
        trail.fingerprint = Some(session.fingerprint());
        self.record_session(&session, GatewayOutcome::Created, Some("init"));

        Ok(json!({
            "sessionToken": session.token,
            "role": role.as_str(),
            "expiry": session.expires_at_ms,
            "ttlMs": self.options.session_ttl_ms,
        }))
    }

    /// Resolves the session behind an authenticated call.
    fn authenticate(
        &self,
        message: &InboundMessage,
        origin: &str,
        source: &SourceId,
        now_ms: u64,
        trail: &mut Trail,
    ) -> Result<GatewaySession, GatewayError> {
        let Some(token) = message.session_token.as_deref() else {
            return Err(GatewayError::new(GatewayErrorCode::SessionTokenMissing, "session token is required"));
        };
        trail.fingerprint = Some(token_fingerprint(token));
        let resolved = self.lock_sessions().authenticate(token, origin, source, now_ms);
        match resolved {
            Ok(session) => {
                trail.role = Some(session.role);
                Ok(session)
            }
            Err(error) => {
                if error.is(GatewayErrorCode::SessionOriginMismatch) || error.is(GatewayErrorCode::SessionSourceMismatch)
                {
                    self.record_closed_token(token, origin, now_ms);
                }
                Err(error)
            }
        }
    }

    /// Builds the `list_tools` result.
    fn list_tools(&self, session: &GatewaySession) -> Value {
        let commands = normalize_catalog(&self.catalog.commands(session.role));
        let ui_slots = normalize_slots(&self.catalog.ui_slots());
        json!({
            "role": session.role.as_str(),
            "capabilities": {
                "methods": GATEWAY_METHODS,
                "routes": TOOL_ROUTES,
                "pluginRegistration": self.plugin_loader.is_some() && session.role == Role::Host,
            },
            "commands": commands,
            "uiSlots": ui_slots,
        })
    }

    /// Routes a `call_tool` message.
    async fn call_tool(&self, message: &InboundMessage, session: &GatewaySession) -> Result<Value, GatewayError> {
        match parse_tool_call(&message.params)? {
            ToolRoute::Command {
                command_id,
                payload,
                meta,
                idempotency_key,
            } => self.call_command(session, command_id, payload, meta, idempotency_key).await,
            ToolRoute::PluginRegister {
                plugin,
            } => self.register_plugin(session, plugin).await,
        }
    }

    /// Dispatches a command route through the bus.
    async fn call_command(
        &self,
        session: &GatewaySession,
        command_id: String,
        payload: Value,
        meta: Map<String, Value>,
        idempotency_key: Option<String>,
    ) -> Result<Value, GatewayError> {
        if !self.bus.registry().contains(&command_id) {
            return Err(GatewayError::new(
                GatewayErrorCode::UnregisteredTool,
                format!("tool '{command_id}' is not registered with the command gateway"),
            ));
        }
        let mut options = DispatchOptions::new().with_role(session.role).with_meta(meta);
        if let Some(key) = idempotency_key {
            options = options.with_idempotency_key(key);
        }
        let dispatched = AssertUnwindSafe(self.bus.dispatch(&command_id, payload, options))
            .catch_unwind()
            .await
            .map_err(|_| {
                GatewayError::new(
                    GatewayErrorCode::CommandDispatchFailed,
                    format!("dispatch of '{command_id}' failed unexpectedly"),
                )
            })?;
        let result = match dispatched.outcome {
            DispatchOutcome::Executed {
                result,
            } => result,
            DispatchOutcome::Failed(failure) => {
                return Err(GatewayError::dispatch(failure.code, failure.message));
            }
        };
        let Some(result) = sanitize_with_limits(&result, "result", self.result_limits).value else {
            return Err(GatewayError::new(
                GatewayErrorCode::NonJsonSafeCommandResult,
                format!("result of '{command_id}' is not JSON-safe"),
            ));
        };
        let mut reply = Map::new();
        reply.insert("route".to_string(), Value::String(COMMAND_ROUTE.to_string()));
        reply.insert("commandId".to_string(), Value::String(command_id));
        reply.insert("result".to_string(), result);
        if dispatched.deduped {
            reply.insert("deduped".to_string(), Value::Bool(true));
        }
        Ok(Value::Object(reply))
    }

    /// Hands a plugin route to the loader.
    async fn register_plugin(&self, session: &GatewaySession, plugin: Value) -> Result<Value, GatewayError> {
        if session.role != Role::Host {
            return Err(GatewayError::new(
                GatewayErrorCode::PluginRegisterForbiddenRole,
                "plugin registration requires a host session",
            ));
        }
        let Some(loader) = &self.plugin_loader else {
            return Err(GatewayError::new(
                GatewayErrorCode::PluginLoaderUnavailable,
                "no plugin loader is configured",
            ));
        };
        let ctx = PluginContext {
            role: session.role,
            origin: session.origin.clone(),
        };
        let loaded = AssertUnwindSafe(loader.register(plugin, ctx)).catch_unwind().await.map_err(|_| {
            GatewayError::new(GatewayErrorCode::PluginRegisterFailed, "plugin loader failed unexpectedly")
        })?;
        match loaded {
            Ok(result) => Ok(json!({
                "route": PLUGIN_REGISTER_ROUTE,
                "result": sanitize_with_limits(&result, "result", self.result_limits).into_value_or_null(),
            })),
            Err(error) if error.code.trim().is_empty() => {
                Err(GatewayError::new(GatewayErrorCode::PluginRegisterFailed, error.message))
            }
            Err(error) => Err(GatewayError::labeled(error.code.trim(), error.message)),
        }
    }

    // ------------------------------------------------------------------------
    // Sessions and audit
    // ------------------------------------------------------------------------

    /// Locks the session store.
    fn lock_sessions(&self) -> MutexGuard<'_, SessionStore> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evicts expired sessions and audits each eviction.
    fn prune_sessions(&self, now_ms: u64) {
        let expired = self.lock_sessions().prune(now_ms);
        for session in &expired {
            self.record_session(session, GatewayOutcome::Expired, None);
        }
    }

    /// Audits a session lifecycle change.
    fn record_session(&self, session: &GatewaySession, outcome: GatewayOutcome, method: Option<&str>) {
        self.record(&GatewayAuditEvent {
            event: SESSION_EVENT,
            timestamp_ms: self.clock.now_ms(),
            method: method.map(str::to_string),
            origin: session.origin.clone(),
            request_id: None,
            outcome,
            error_code: None,
            role: Some(session.role),
            session_fingerprint: Some(session.fingerprint()),
        });
    }

    /// Audits a session closed by a mismatched use.
    fn record_closed_token(&self, token: &str, origin: &str, now_ms: u64) {
        self.record(&GatewayAuditEvent {
            event: SESSION_EVENT,
            timestamp_ms: now_ms,
            method: None,
            origin: origin.to_string(),
            request_id: None,
            outcome: GatewayOutcome::Closed,
            error_code: None,
            role: None,
            session_fingerprint: Some(token_fingerprint(token)),
        });
    }

    /// Audits a handled message.
    fn record_message(
        &self,
        now_ms: u64,
        method: Option<&str>,
        origin: &str,
        id: &Value,
        outcome: Result<&Value, &GatewayError>,
        trail: &Trail,
    ) {
        self.record(&GatewayAuditEvent {
            event: MESSAGE_EVENT,
            timestamp_ms: now_ms,
            method: method.map(str::to_string),
            origin: origin.to_string(),
            request_id: request_id_label(id),
            outcome: if outcome.is_ok() { GatewayOutcome::Ok } else { GatewayOutcome::Error },
            error_code: outcome.err().map(|error| error.code.clone()),
            role: trail.role,
            session_fingerprint: trail.fingerprint.clone(),
        });
    }

    /// Hands an event to the sink, containing sink panics.
    fn record(&self, event: &GatewayAuditEvent) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.audit_sink.record_gateway(event)));
    }
}

/// Builds the `invalid-role` error.
fn invalid_role() -> GatewayError {
    GatewayError::new(GatewayErrorCode::InvalidRole, "role must be 'host' or 'student'")
}

/// Returns the serialized size of a value.
fn encoded_len(value: &Value) -> usize {
    serde_json::to_vec(value).map_or(usize::MAX, |bytes| bytes.len())
}

// ============================================================================
// SECTION: Scheduling
// ============================================================================

/// Per-source FIFO scheduler for channel events.
struct EventScheduler {
    /// Runtime handling the events.
    runtime: Arc<GatewayRuntime>,
    /// Sources with a handler in flight, and their waiting events.
    busy: HashMap<SourceId, VecDeque<ChannelEvent>>,
    /// In-flight handlers; each yields its source when done.
    tasks: JoinSet<SourceId>,
}

impl EventScheduler {
    /// Creates an idle scheduler.
    fn new(runtime: Arc<GatewayRuntime>) -> Self {
        Self {
            runtime,
            busy: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Returns true when no handler is running.
    fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs `event` now, or queues it behind its source's running handler.
    fn accept(&mut self, event: ChannelEvent) {
        if let Some(queue) = self.busy.get_mut(&event.source) {
            queue.push_back(event);
            return;
        }
        self.busy.insert(event.source.clone(), VecDeque::new());
        self.spawn(event);
    }

    /// Starts the next queued event for `source`, or marks it idle.
    fn finish(&mut self, source: SourceId) {
        match self.busy.get_mut(&source).and_then(VecDeque::pop_front) {
            Some(event) => self.spawn(event),
            None => {
                self.busy.remove(&source);
            }
        }
    }

    /// Spawns the handler for one event.
    fn spawn(&mut self, event: ChannelEvent) {
        let runtime = Arc::clone(&self.runtime);
        self.tasks.spawn(async move {
            let source = event.source.clone();
            let _ = AssertUnwindSafe(runtime.handle_event(event)).catch_unwind().await;
            source
        });
    }

    /// Drops queued events and aborts running handlers.
    async fn shutdown(&mut self) {
        self.busy.clear();
        self.tasks.shutdown().await;
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Running gateway subscription.
pub struct GatewayHandle {
    /// Runtime serving the subscription.
    runtime: Arc<GatewayRuntime>,
    /// Channel subscription.
    subscription: Box<dyn Subscription>,
    /// Stop signal for the event loop.
    stop: oneshot::Sender<()>,
    /// Event loop task.
    task: JoinHandle<()>,
}

impl GatewayHandle {
    /// Unsubscribes, aborts in-flight handlers, and closes every session.
    pub async fn stop(self) {
        let Self {
            runtime,
            subscription,
            stop,
            task,
        } = self;
        subscription.unsubscribe();
        let _ = stop.send(());
        let _ = task.await;
        runtime.close_all_sessions();
    }

    /// Waits for the channel to end and every handler to finish, then closes
    /// every session.
    pub async fn wait(self) {
        let Self {
            runtime,
            subscription,
            stop,
            task,
        } = self;
        let _ = task.await;
        drop(stop);
        subscription.unsubscribe();
        runtime.close_all_sessions();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
