//! # hostlink
//!
//! A capability gateway: host applications register namespaced, schema-typed
//! capabilities, and remote gateways invoke them over a persistent WebSocket
//! session or an MCP-style HTTP tool transport.
//!
//! The crate is organized in four layers:
//!
//! - [`core`]: the capability registry, the execution engine with its
//!   interceptor chain (permissions, auditing), and schema validation.
//! - [`gateway`]: the WebSocket wire protocol, session lifecycle, token
//!   authentication, and heartbeat supervision.
//! - [`mcp`]: projection of the capability catalog into tool definitions
//!   plus the HTTP endpoints that list and call them.
//! - [`events`]: in-process event fan-out for providers and subscribers.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hostlink::core::{
//!     CapabilityDescriptor, CapabilityRegistry, CapabilityType, ExecutionEngine,
//!     TracingAuditSink,
//! };
//! use hostlink::core::capability::ProviderDescriptor;
//! use serde_json::json;
//!
//! let audit = Arc::new(TracingAuditSink::new());
//! let registry = Arc::new(CapabilityRegistry::new(audit.clone()));
//! registry.register(
//!     ProviderDescriptor::new("world", "1.0.0"),
//!     vec![CapabilityDescriptor::new(
//!         "world.time.get",
//!         CapabilityType::Context,
//!         Arc::new(|_| Box::pin(async { Ok(json!({"time": 6000})) })),
//!     )],
//! ).unwrap();
//! let engine = ExecutionEngine::with_defaults(registry, audit);
//! ```

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod mcp;

pub use config::{GatewayConfig, ServerInfo};
pub use errors::{ErrorCode, HostlinkError};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
