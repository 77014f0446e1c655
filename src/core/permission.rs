//! Permission checking interceptor.
//!
//! Runs early in the execution chain (order 100). An invocation is denied
//! when the caller's permission set does not fully cover the capability's
//! declared permissions, or when the capability's risk level maps to a
//! role the caller lacks.

use async_trait::async_trait;

use crate::core::execution::{ExecutionContext, ExecutionInterceptor};
use crate::errors::HostlinkError;

/// Interceptor enforcing permission sets and risk-level roles.
#[derive(Debug, Default)]
pub struct PermissionChecker;

impl PermissionChecker {
    /// Permission checker order value; early in the chain.
    pub const ORDER: i32 = 100;

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionInterceptor for PermissionChecker {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn pre_handle(&self, ctx: &mut ExecutionContext) -> Result<(), HostlinkError> {
        let capability = &ctx.capability;
        let caller = &ctx.caller;

        if caller.id.is_empty() {
            return Err(HostlinkError::PermissionDenied(
                "no caller information available".to_string(),
            ));
        }

        let required = capability.permissions.iter().map(String::as_str);
        if !caller.has_all_permissions(required) {
            tracing::debug!(
                capability_id = %capability.id,
                caller_id = %caller.id,
                required = ?capability.permissions,
                "permission check failed"
            );
            return Err(HostlinkError::PermissionDenied(format!(
                "insufficient permissions to execute capability: {}",
                capability.id
            )));
        }

        if let Some(role) = capability.risk_level.required_role() {
            if !caller.has_role(role) {
                tracing::debug!(
                    capability_id = %capability.id,
                    caller_id = %caller.id,
                    required_role = role,
                    "role check failed"
                );
                return Err(HostlinkError::PermissionDenied(format!(
                    "insufficient role to execute capability: {} (requires {role})",
                    capability.id
                )));
            }
        }

        tracing::debug!(capability_id = %capability.id, "permission check passed");
        Ok(())
    }
}
