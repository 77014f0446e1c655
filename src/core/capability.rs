//! Capability and provider descriptors.
//!
//! A capability is one invokable, named operation with declared schemas,
//! permissions, and risk metadata. Providers register capabilities
//! programmatically by constructing descriptors and passing them to the
//! [`CapabilityRegistry`](super::registry::CapabilityRegistry); there is no
//! reflection-based discovery.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::HostlinkError;

/// The callable behind a capability.
///
/// Receives the validated parameter object and resolves to the raw result
/// value. Handlers run on the worker pool, never on a connection's I/O
/// task, so they may perform blocking host-application calls behind
/// `spawn_blocking` if needed.
pub type CapabilityHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HostlinkError>> + Send + Sync>;

/// Classification of what invoking a capability does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityType {
    /// Read-only query of host state.
    Context,
    /// Mutates host state.
    Action,
    /// Notification-only; never invoked directly.
    Event,
}

/// Coarse severity classification driving role-based authorization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Role the caller must hold to invoke a capability at this level.
    pub fn required_role(&self) -> Option<&'static str> {
        match self {
            Self::Low => None,
            Self::Medium => Some("operator"),
            Self::High => Some("admin"),
            Self::Critical => Some("super_admin"),
        }
    }
}

/// Behavioral flags a provider may declare on a capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapabilityFlags {
    /// The action can be rolled back after execution.
    pub rollback_supported: bool,
    /// A snapshot must be taken before execution.
    pub snapshot_required: bool,
    /// Execution requires an explicit confirmation step.
    pub confirm_required: bool,
    /// Results may be cached.
    pub cacheable: bool,
    /// Cache TTL in seconds, meaningful only when `cacheable` is set.
    pub cache_ttl_secs: u64,
}

/// A registered capability: metadata plus the opaque handler.
///
/// The id is immutable once registered. By convention (not enforced) it is
/// namespaced under the owning provider's id, e.g. `world.time.get` under
/// provider `world`.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    /// Globally unique, namespaced identifier.
    pub id: String,
    /// Semantic version of this capability.
    pub version: String,
    /// What invoking it does.
    pub capability_type: CapabilityType,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the parameter object, if any.
    pub parameter_schema: Option<Value>,
    /// JSON Schema for the return value, if any.
    pub return_schema: Option<Value>,
    /// Severity classification.
    pub risk_level: RiskLevel,
    /// Permissions the caller must hold, all of them.
    pub permissions: Vec<String>,
    /// Behavioral flags.
    pub flags: CapabilityFlags,
    /// Searchable tags.
    pub tags: Vec<String>,
    /// Owning provider id; set by the registry at registration time.
    pub provider_id: String,
    /// The callable that executes the capability.
    pub handler: CapabilityHandler,
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("capability_type", &self.capability_type)
            .field("risk_level", &self.risk_level)
            .field("permissions", &self.permissions)
            .field("provider_id", &self.provider_id)
            .finish_non_exhaustive()
    }
}

impl CapabilityDescriptor {
    /// Create a descriptor with the minimum required fields. Everything
    /// else defaults and can be filled in with the `with_*` methods.
    pub fn new(
        id: impl Into<String>,
        capability_type: CapabilityType,
        handler: CapabilityHandler,
    ) -> Self {
        Self {
            id: id.into(),
            version: "1.0.0".to_string(),
            capability_type,
            description: String::new(),
            parameter_schema: None,
            return_schema: None,
            risk_level: RiskLevel::Low,
            permissions: Vec::new(),
            flags: CapabilityFlags::default(),
            tags: Vec::new(),
            provider_id: String::new(),
            handler,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the parameter schema.
    pub fn with_parameter_schema(mut self, schema: Value) -> Self {
        self.parameter_schema = Some(schema);
        self
    }

    /// Set the return schema.
    pub fn with_return_schema(mut self, schema: Value) -> Self {
        self.return_schema = Some(schema);
        self
    }

    /// Set the risk level.
    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    /// Set the required permission set.
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set the behavioral flags.
    pub fn with_flags(mut self, flags: CapabilityFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the searchable tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Namespace prefix of the id (`world` for `world.time.get`).
    pub fn namespace(&self) -> &str {
        self.id.split('.').next().unwrap_or(&self.id)
    }

    /// Serializable view without the handler, for catalogs and tool lists.
    pub fn manifest(&self) -> CapabilityManifest {
        CapabilityManifest {
            id: self.id.clone(),
            version: self.version.clone(),
            capability_type: self.capability_type,
            description: self.description.clone(),
            parameter_schema: self.parameter_schema.clone(),
            return_schema: self.return_schema.clone(),
            risk_level: self.risk_level,
            permissions: self.permissions.clone(),
            flags: self.flags.clone(),
            tags: self.tags.clone(),
            provider_id: self.provider_id.clone(),
        }
    }
}

/// Handler-free view of a capability, safe to serialize onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityManifest {
    pub id: String,
    pub version: String,
    #[serde(rename = "type")]
    pub capability_type: CapabilityType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_schema: Option<Value>,
    pub risk_level: RiskLevel,
    pub permissions: Vec<String>,
    pub flags: CapabilityFlags,
    pub tags: Vec<String>,
    pub provider_id: String,
}

/// A named, versioned bundle of capabilities registered together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Unique provider id, conventionally the namespace prefix of its
    /// capabilities.
    pub id: String,
    /// Provider version.
    pub version: String,
    /// Human-readable description.
    pub description: String,
}

impl ProviderDescriptor {
    /// Create a provider descriptor.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            description: String::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
