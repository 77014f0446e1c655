//! Token authentication for incoming gateway connections.

use crate::config::GatewayConfig;

/// Outcome of an authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub success: bool,
    pub permissions: Vec<String>,
    pub reason: Option<String>,
}

impl AuthResult {
    fn success(permissions: Vec<String>) -> Self {
        Self {
            success: true,
            permissions,
            reason: None,
        }
    }

    fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            permissions: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Validates presented tokens against the configured shared secret.
///
/// When no token is configured the handler runs in development mode and
/// accepts every connection. Successful authentication currently grants
/// the wildcard permission; per-gateway grants would hang off this type.
pub struct AuthHandler {
    config: GatewayConfig,
}

impl AuthHandler {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn authenticate(&self, gateway_id: &str, token: &str) -> AuthResult {
        if gateway_id.is_empty() {
            return AuthResult::failure("gateway id is required");
        }

        let configured = match self.config.auth_token.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                tracing::warn!(
                    gateway_id,
                    "no auth token configured, accepting connection (development mode)"
                );
                return AuthResult::success(vec!["*".to_string()]);
            }
        };

        if token == configured {
            tracing::info!(gateway_id, "gateway authenticated");
            AuthResult::success(vec!["*".to_string()])
        } else {
            tracing::warn!(gateway_id, "authentication failed: invalid token");
            AuthResult::failure("invalid token")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token(token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            auth_token: token.map(String::from),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_valid_token_accepted() {
        let handler = AuthHandler::new(config_with_token(Some("secret")));
        let result = handler.authenticate("gw-1", "secret");
        assert!(result.success);
        assert_eq!(result.permissions, vec!["*".to_string()]);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = AuthHandler::new(config_with_token(Some("secret")));
        let result = handler.authenticate("gw-1", "wrong");
        assert!(!result.success);
        assert!(result.reason.is_some());
    }

    #[test]
    fn test_unconfigured_token_accepts_all() {
        let handler = AuthHandler::new(config_with_token(None));
        assert!(handler.authenticate("gw-1", "anything").success);

        let handler = AuthHandler::new(config_with_token(Some("")));
        assert!(handler.authenticate("gw-1", "").success);
    }

    #[test]
    fn test_missing_gateway_id_rejected() {
        let handler = AuthHandler::new(config_with_token(None));
        assert!(!handler.authenticate("", "t").success);
    }
}
