//! Core capability pipeline: registry, execution engine, interceptors,
//! schema validation, and the audit trail.

pub mod audit;
pub mod capability;
pub mod execution;
pub mod permission;
pub mod registry;
pub mod schema;

pub use audit::{
    AuditEvent, AuditEventType, AuditLogger, AuditSink, MemoryAuditSink, TracingAuditSink,
};
pub use capability::{
    CapabilityDescriptor, CapabilityFlags, CapabilityHandler, CapabilityManifest, CapabilityType,
    ProviderDescriptor, RiskLevel,
};
pub use execution::{
    CallerInfo, CapabilityRequest, CapabilityResponse, ExecutionContext, ExecutionEngine,
    ExecutionInterceptor,
};
pub use permission::PermissionChecker;
pub use registry::CapabilityRegistry;
pub use schema::SchemaValidator;
