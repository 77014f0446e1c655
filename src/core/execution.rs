//! Execution engine: the capability invocation pipeline.
//!
//! `execute` resolves the capability, builds a per-invocation
//! [`ExecutionContext`], runs the interceptor chain in ascending order,
//! validates parameters, invokes the handler on the worker pool, validates
//! the return value, and produces a structured [`CapabilityResponse`].
//!
//! Interceptors are independent observers, not a wrapping stack: both
//! `pre_handle` and `post_handle` run in the same ascending `order()`
//! sequence, and so does `on_error`. Tests pin this down because it is
//! easy to invert by accident.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::capability::CapabilityDescriptor;
use crate::core::registry::CapabilityRegistry;
use crate::core::schema::SchemaValidator;
use crate::errors::{ErrorCode, HostlinkError};

/// Caller identity for one invocation, derived from the authenticated
/// session at dispatch time. Immutable per invocation.
#[derive(Debug, Clone, Default)]
pub struct CallerInfo {
    /// Stable caller id (gateway id, player id, ...).
    pub id: String,
    /// Display name, for logs and audit.
    pub display_name: String,
    /// Granted permissions. A trailing `.*` segment or a bare `*` acts as
    /// a prefix wildcard.
    pub permissions: HashSet<String>,
    /// Granted roles, matched against risk-level requirements.
    pub roles: HashSet<String>,
}

impl CallerInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            permissions: HashSet::new(),
            roles: HashSet::new(),
        }
    }

    /// Replace the permission set.
    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = String>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    /// Replace the role set.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    /// Whether a single required permission is covered, including wildcard
    /// grants (`*` covers everything, `world.*` covers `world.time.get`).
    pub fn has_permission(&self, required: &str) -> bool {
        self.permissions.iter().any(|granted| {
            if granted == required || granted == "*" {
                return true;
            }
            match granted.strip_suffix(".*") {
                Some(prefix) => {
                    required == prefix || required.starts_with(&format!("{prefix}."))
                }
                None => false,
            }
        })
    }

    /// Whether every permission in the set is covered.
    pub fn has_all_permissions<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> bool {
        required.into_iter().all(|p| self.has_permission(p))
    }

    /// Whether the caller holds a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// One capability invocation as it arrives from a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRequest {
    /// Target capability id.
    pub capability_id: String,
    /// Parameter object; defaults to an empty object.
    #[serde(default = "empty_object")]
    pub parameters: Value,
    /// Optional caller override supplied by the transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl CapabilityRequest {
    pub fn new(capability_id: impl Into<String>, parameters: Value) -> Self {
        Self {
            capability_id: capability_id.into(),
            parameters,
            caller_id: None,
        }
    }
}

/// Outcome of one invocation: success with data, or a structured error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CapabilityResponse {
    /// Successful response carrying the handler result (or `None` for a
    /// skipped invocation).
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error_code: None,
            error_message: None,
        }
    }

    /// Error response with the client-safe message for the error.
    pub fn error(err: &HostlinkError) -> Self {
        Self {
            success: false,
            data: None,
            error_code: Some(err.code()),
            error_message: Some(err.client_message()),
        }
    }
}

/// Mutable single-invocation state threaded through the interceptor chain.
///
/// Created per request and discarded once the response is produced; never
/// shared across invocations.
pub struct ExecutionContext {
    /// The original request.
    pub request: CapabilityRequest,
    /// The resolved capability.
    pub capability: Arc<CapabilityDescriptor>,
    /// Who is invoking.
    pub caller: CallerInfo,
    /// Parsed parameter object.
    pub parameters: Value,
    /// Free-form scratch space interceptors may write to.
    pub metadata: HashMap<String, Value>,
    /// Set by an interceptor to end the chain without invoking the handler.
    /// The invocation still produces a normal (empty) success response.
    pub skip: bool,
    /// Handler result, populated after a successful invocation.
    pub result: Option<Value>,
}

impl ExecutionContext {
    fn new(request: CapabilityRequest, capability: Arc<CapabilityDescriptor>, caller: CallerInfo) -> Self {
        let parameters = request.parameters.clone();
        Self {
            request,
            capability,
            caller,
            parameters,
            metadata: HashMap::new(),
            skip: false,
            result: None,
        }
    }
}

/// Cross-cutting policy module run around every invocation.
///
/// Lower `order()` runs first. `pre_handle` may abort the chain by
/// returning an error (short-circuits to an error response) or by setting
/// the context's skip flag (no handler call, normal response).
#[async_trait]
pub trait ExecutionInterceptor: Send + Sync {
    /// Position in the chain; lower runs first.
    fn order(&self) -> i32;

    /// Runs before the handler. Errors abort the chain.
    async fn pre_handle(&self, ctx: &mut ExecutionContext) -> Result<(), HostlinkError>;

    /// Runs after a successful handler invocation, in ascending order.
    async fn post_handle(&self, _ctx: &ExecutionContext, _result: &Value) {}

    /// Runs when any step of the pipeline fails, in ascending order.
    async fn on_error(&self, _ctx: &ExecutionContext, _error: &HostlinkError) {}
}

/// Orchestrates registry lookup, the interceptor chain, schema validation,
/// and handler invocation.
pub struct ExecutionEngine {
    registry: Arc<CapabilityRegistry>,
    validator: SchemaValidator,
    interceptors: Vec<Arc<dyn ExecutionInterceptor>>,
}

impl ExecutionEngine {
    /// Engine with no interceptors installed.
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            validator: SchemaValidator::new(),
            interceptors: Vec::new(),
        }
    }

    /// Engine with the built-in interceptors: permission checker
    /// (order 100) and audit logger (order 200).
    pub fn with_defaults(
        registry: Arc<CapabilityRegistry>,
        audit_sink: Arc<dyn crate::core::audit::AuditSink>,
    ) -> Self {
        let mut engine = Self::new(registry);
        engine.add_interceptor(Arc::new(crate::core::permission::PermissionChecker::new()));
        engine.add_interceptor(Arc::new(crate::core::audit::AuditLogger::new(audit_sink)));
        engine
    }

    /// Install an interceptor, keeping the chain sorted ascending by
    /// `order()` (stable for equal orders).
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn ExecutionInterceptor>) {
        self.interceptors.push(interceptor);
        self.interceptors.sort_by_key(|i| i.order());
    }

    /// Run one invocation to completion.
    ///
    /// Never returns an `Err`: every failure is converted to a structured
    /// error response. The handler itself runs on a spawned task, so a
    /// slow or panicking handler cannot take the calling task down with it.
    pub async fn execute(&self, request: CapabilityRequest, caller: CallerInfo) -> CapabilityResponse {
        let capability = match self.registry.lookup(&request.capability_id) {
            Ok(capability) => capability,
            Err(err) => {
                tracing::debug!(capability_id = %request.capability_id, "capability not found");
                return CapabilityResponse::error(&err);
            }
        };

        let mut ctx = ExecutionContext::new(request, capability, caller);

        match self.run_pipeline(&mut ctx).await {
            Ok(data) => CapabilityResponse::ok(data),
            Err(err) => {
                for interceptor in &self.interceptors {
                    interceptor.on_error(&ctx, &err).await;
                }
                CapabilityResponse::error(&err)
            }
        }
    }

    async fn run_pipeline(&self, ctx: &mut ExecutionContext) -> Result<Option<Value>, HostlinkError> {
        for interceptor in &self.interceptors {
            interceptor.pre_handle(ctx).await?;
            if ctx.skip {
                tracing::debug!(
                    capability_id = %ctx.capability.id,
                    "invocation skipped by interceptor"
                );
                return Ok(None);
            }
        }

        self.validator.validate_parameters(
            &ctx.capability.id,
            ctx.capability.parameter_schema.as_ref(),
            &ctx.parameters,
        )?;

        // Handler runs on its own task so connection I/O is never blocked
        // and a panic is contained as an internal error.
        let handler = ctx.capability.handler.clone();
        let parameters = ctx.parameters.clone();
        let result = match tokio::spawn((handler)(parameters)).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => return Err(err),
            Err(join_err) => {
                tracing::error!(
                    capability_id = %ctx.capability.id,
                    error = %join_err,
                    "capability handler panicked"
                );
                return Err(HostlinkError::Internal(format!(
                    "capability handler failed: {join_err}"
                )));
            }
        };

        self.validator.validate_return(
            &ctx.capability.id,
            ctx.capability.return_schema.as_ref(),
            &result,
        )?;

        ctx.result = Some(result.clone());
        for interceptor in &self.interceptors {
            interceptor.post_handle(ctx, &result).await;
        }

        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::{AuditEventType, MemoryAuditSink};
    use crate::core::capability::{CapabilityHandler, CapabilityType, ProviderDescriptor, RiskLevel};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> CapabilityHandler {
        Arc::new(move |_params| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"ok": true}))
            })
        })
    }

    fn echo_handler() -> CapabilityHandler {
        Arc::new(|params| Box::pin(async move { Ok(params) }))
    }

    fn registry_with(
        caps: Vec<CapabilityDescriptor>,
        sink: Arc<dyn crate::core::audit::AuditSink>,
    ) -> Arc<CapabilityRegistry> {
        let registry = Arc::new(CapabilityRegistry::new(sink));
        registry
            .register(ProviderDescriptor::new("test", "1.0.0"), caps)
            .unwrap();
        registry
    }

    fn wildcard_caller() -> CallerInfo {
        CallerInfo::new("tester").with_permissions(["*".to_string()])
    }

    #[tokio::test]
    async fn test_execute_success_path() {
        let sink = Arc::new(MemoryAuditSink::new());
        let cap = CapabilityDescriptor::new("test.echo", CapabilityType::Context, echo_handler());
        let registry = registry_with(vec![cap], sink.clone());
        let engine = ExecutionEngine::with_defaults(registry, sink);

        let response = engine
            .execute(
                CapabilityRequest::new("test.echo", json!({"msg": "hi"})),
                wildcard_caller(),
            )
            .await;

        assert!(response.success);
        assert_eq!(response.data.unwrap()["msg"], "hi");
    }

    #[tokio::test]
    async fn test_unknown_capability_is_structured_error() {
        let sink = Arc::new(MemoryAuditSink::new());
        let registry = Arc::new(CapabilityRegistry::new(sink.clone()));
        let engine = ExecutionEngine::with_defaults(registry, sink);

        let response = engine
            .execute(CapabilityRequest::new("nope", json!({})), wildcard_caller())
            .await;

        assert!(!response.success);
        assert_eq!(response.error_code, Some(ErrorCode::CapabilityNotFound));
    }

    #[tokio::test]
    async fn test_permission_denied_never_invokes_handler() {
        let sink = Arc::new(MemoryAuditSink::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let cap = CapabilityDescriptor::new(
            "test.guarded",
            CapabilityType::Action,
            counting_handler(counter.clone()),
        )
        .with_permissions(vec!["p1".to_string()]);
        let registry = registry_with(vec![cap], sink.clone());
        let engine = ExecutionEngine::with_defaults(registry, sink);

        let caller = CallerInfo::new("limited").with_permissions(["other".to_string()]);
        let response = engine
            .execute(CapabilityRequest::new("test.guarded", json!({})), caller)
            .await;

        assert!(!response.success);
        assert_eq!(response.error_code, Some(ErrorCode::PermissionDenied));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parameter_validation_gates_handler() {
        let sink = Arc::new(MemoryAuditSink::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let cap = CapabilityDescriptor::new(
            "test.typed",
            CapabilityType::Context,
            counting_handler(counter.clone()),
        )
        .with_parameter_schema(json!({
            "type": "object",
            "required": ["x"],
            "properties": {"x": {"type": "integer", "minimum": 0}}
        }));
        let registry = registry_with(vec![cap], sink.clone());
        let engine = ExecutionEngine::with_defaults(registry, sink);

        let response = engine
            .execute(
                CapabilityRequest::new("test.typed", json!({"x": -1})),
                wildcard_caller(),
            )
            .await;
        assert_eq!(response.error_code, Some(ErrorCode::ParameterInvalid));

        let response = engine
            .execute(CapabilityRequest::new("test.typed", json!({})), wildcard_caller())
            .await;
        assert_eq!(response.error_code, Some(ErrorCode::ParameterRequired));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let response = engine
            .execute(
                CapabilityRequest::new("test.typed", json!({"x": 5})),
                wildcard_caller(),
            )
            .await;
        assert!(response.success);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_is_internal_without_detail() {
        let sink = Arc::new(MemoryAuditSink::new());
        let handler: CapabilityHandler = Arc::new(|_| {
            Box::pin(async { Err(HostlinkError::Internal("db connection string leaked".into())) })
        });
        let cap = CapabilityDescriptor::new("test.fails", CapabilityType::Action, handler);
        let registry = registry_with(vec![cap], sink.clone());
        let engine = ExecutionEngine::with_defaults(registry, sink);

        let response = engine
            .execute(CapabilityRequest::new("test.fails", json!({})), wildcard_caller())
            .await;

        assert!(!response.success);
        assert_eq!(response.error_code, Some(ErrorCode::InternalError));
        assert_eq!(response.error_message.as_deref(), Some("internal error"));
    }

    #[tokio::test]
    async fn test_audit_records_invoke_then_completed() {
        let sink = Arc::new(MemoryAuditSink::new());
        let cap = CapabilityDescriptor::new("test.echo", CapabilityType::Context, echo_handler());
        let registry = registry_with(vec![cap], sink.clone());
        sink.clear(); // drop the provider-registered event
        let engine = ExecutionEngine::with_defaults(registry, sink.clone());

        let response = engine
            .execute(
                CapabilityRequest::new("test.echo", json!({"token": "secret-token"})),
                wildcard_caller(),
            )
            .await;
        assert!(response.success);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::Invoke);
        assert_eq!(events[1].event_type, AuditEventType::Completed);
        assert_eq!(events[0].capability_id, "test.echo");
        assert_eq!(events[1].capability_id, "test.echo");
        assert_eq!(events[0].caller_id.as_deref(), Some("tester"));
        assert_eq!(events[1].caller_id.as_deref(), Some("tester"));
        // Secrets never reach the audit trail.
        assert_eq!(events[0].request.as_ref().unwrap()["token"], "[REDACTED]");
    }

    #[tokio::test]
    async fn test_denied_invocation_audits_permission_denied() {
        let sink = Arc::new(MemoryAuditSink::new());
        let cap = CapabilityDescriptor::new("test.guarded", CapabilityType::Action, echo_handler())
            .with_permissions(vec!["p1".to_string()]);
        let registry = registry_with(vec![cap], sink.clone());
        sink.clear();
        let engine = ExecutionEngine::with_defaults(registry, sink.clone());

        let caller = CallerInfo::new("limited");
        let _ = engine
            .execute(CapabilityRequest::new("test.guarded", json!({})), caller)
            .await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::PermissionDenied);
        assert!(!events[0].success);
    }

    /// Interceptor that logs its order value into a shared trace on each
    /// phase, to pin down the ascending-order contract.
    struct TracingInterceptor {
        value: i32,
        trace: Arc<Mutex<Vec<(i32, &'static str)>>>,
    }

    #[async_trait]
    impl ExecutionInterceptor for TracingInterceptor {
        fn order(&self) -> i32 {
            self.value
        }
        async fn pre_handle(&self, _ctx: &mut ExecutionContext) -> Result<(), HostlinkError> {
            self.trace.lock().push((self.value, "pre"));
            Ok(())
        }
        async fn post_handle(&self, _ctx: &ExecutionContext, _result: &Value) {
            self.trace.lock().push((self.value, "post"));
        }
        async fn on_error(&self, _ctx: &ExecutionContext, _error: &HostlinkError) {
            self.trace.lock().push((self.value, "err"));
        }
    }

    #[tokio::test]
    async fn test_post_handle_runs_ascending_not_reversed() {
        let sink = Arc::new(MemoryAuditSink::new());
        let cap = CapabilityDescriptor::new("test.echo", CapabilityType::Context, echo_handler());
        let registry = registry_with(vec![cap], sink);
        let trace = Arc::new(Mutex::new(Vec::new()));

        let mut engine = ExecutionEngine::new(registry);
        // Registered out of order on purpose.
        engine.add_interceptor(Arc::new(TracingInterceptor { value: 300, trace: trace.clone() }));
        engine.add_interceptor(Arc::new(TracingInterceptor { value: 100, trace: trace.clone() }));
        engine.add_interceptor(Arc::new(TracingInterceptor { value: 200, trace: trace.clone() }));

        let response = engine
            .execute(CapabilityRequest::new("test.echo", json!({})), wildcard_caller())
            .await;
        assert!(response.success);

        let observed = trace.lock().clone();
        assert_eq!(
            observed,
            vec![
                (100, "pre"),
                (200, "pre"),
                (300, "pre"),
                (100, "post"),
                (200, "post"),
                (300, "post"),
            ]
        );
    }

    /// Interceptor that sets the skip flag.
    struct SkippingInterceptor;

    #[async_trait]
    impl ExecutionInterceptor for SkippingInterceptor {
        fn order(&self) -> i32 {
            50
        }
        async fn pre_handle(&self, ctx: &mut ExecutionContext) -> Result<(), HostlinkError> {
            ctx.skip = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_skip_flag_produces_normal_response_without_handler() {
        let sink = Arc::new(MemoryAuditSink::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let cap = CapabilityDescriptor::new(
            "test.skipped",
            CapabilityType::Context,
            counting_handler(counter.clone()),
        );
        let registry = registry_with(vec![cap], sink);

        let mut engine = ExecutionEngine::new(registry);
        engine.add_interceptor(Arc::new(SkippingInterceptor));

        let response = engine
            .execute(CapabilityRequest::new("test.skipped", json!({})), wildcard_caller())
            .await;

        assert!(response.success);
        assert!(response.data.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wildcard_permission_matching() {
        let caller = CallerInfo::new("c").with_permissions(["world.*".to_string()]);
        assert!(caller.has_permission("world.time.get"));
        assert!(caller.has_permission("world"));
        assert!(!caller.has_permission("worldly.time"));
        assert!(!caller.has_permission("chat.send"));

        let all = CallerInfo::new("c").with_permissions(["*".to_string()]);
        assert!(all.has_permission("anything.at.all"));
    }
}
