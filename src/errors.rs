//! Error taxonomy for hostlink.
//!
//! Every failure that can cross the wire carries a stable [`ErrorCode`]
//! string alongside a human-readable message. Validation, permission, and
//! auth failures are expected control flow: they are caught at the
//! execution-chain or router boundary and converted into structured error
//! responses. No error here may tear down more than a single session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes as they appear in wire responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The requested capability id is not registered.
    CapabilityNotFound,
    /// A capability id was already registered and overwrite was not allowed.
    DuplicateCapability,
    /// A provider id was already registered and overwrite was not allowed.
    DuplicateProvider,
    /// The provider id is not registered.
    ProviderNotFound,
    /// The session id is unknown to the session manager.
    SessionNotFound,
    /// The caller lacks a required permission or role.
    PermissionDenied,
    /// A parameter declared required by the schema is missing.
    ParameterRequired,
    /// A parameter is present but violates its declared schema.
    ParameterInvalid,
    /// Schema validation itself failed unexpectedly.
    SchemaValidationFailed,
    /// A wire frame could not be encoded or decoded.
    CodecError,
    /// Token validation failed during the session handshake.
    AuthFailed,
    /// A capability id violates the tool naming constraints.
    InvalidName,
    /// Unexpected handler failure; detail is never surfaced to clients.
    InternalError,
}

impl ErrorCode {
    /// The wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapabilityNotFound => "CAPABILITY_NOT_FOUND",
            Self::DuplicateCapability => "DUPLICATE_CAPABILITY",
            Self::DuplicateProvider => "DUPLICATE_PROVIDER",
            Self::ProviderNotFound => "PROVIDER_NOT_FOUND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ParameterRequired => "PARAMETER_REQUIRED",
            Self::ParameterInvalid => "PARAMETER_INVALID",
            Self::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            Self::CodecError => "CODEC_ERROR",
            Self::AuthFailed => "AUTH_FAILED",
            Self::InvalidName => "INVALID_NAME",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the capability pipeline and the gateway protocol.
#[derive(Debug, Error, Clone)]
pub enum HostlinkError {
    /// Lookup of an unregistered capability id.
    #[error("capability not found: {0}")]
    CapabilityNotFound(String),

    /// Registration collided with an existing capability id.
    #[error("duplicate capability id: {0}")]
    DuplicateCapability(String),

    /// Registration collided with an existing provider id.
    #[error("duplicate provider id: {0}")]
    DuplicateProvider(String),

    /// Lookup of an unregistered provider id.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Lookup of an unknown session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The caller does not satisfy the capability's permission or role
    /// requirements.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A parameter or return value violated its declared schema.
    #[error("{message}")]
    Validation {
        /// One of the `PARAMETER_*` / `SCHEMA_*` codes.
        code: ErrorCode,
        /// What failed and for which capability.
        message: String,
    },

    /// Malformed wire data. The offending frame is dropped, never the
    /// connection.
    #[error("codec error: {0}")]
    Codec(String),

    /// The session handshake presented an invalid token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A capability id cannot be expressed as a tool name.
    #[error("invalid tool name: {0}")]
    InvalidName(String),

    /// Unexpected failure inside a capability handler.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HostlinkError {
    /// Structured code for wire responses.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CapabilityNotFound(_) => ErrorCode::CapabilityNotFound,
            Self::DuplicateCapability(_) => ErrorCode::DuplicateCapability,
            Self::DuplicateProvider(_) => ErrorCode::DuplicateProvider,
            Self::ProviderNotFound(_) => ErrorCode::ProviderNotFound,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::Validation { code, .. } => *code,
            Self::Codec(_) => ErrorCode::CodecError,
            Self::AuthFailed(_) => ErrorCode::AuthFailed,
            Self::InvalidName(_) => ErrorCode::InvalidName,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Message safe to surface to a remote client.
    ///
    /// Internal handler failures are collapsed to a generic message so
    /// exception detail never leaks across the wire; everything else is
    /// expected control flow and passes through verbatim.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Shorthand for a parameter-level validation failure.
    pub fn parameter_invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::ParameterInvalid,
            message: message.into(),
        }
    }

    /// Shorthand for a missing required parameter.
    pub fn parameter_required(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::ParameterRequired,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable_strings() {
        assert_eq!(ErrorCode::CapabilityNotFound.as_str(), "CAPABILITY_NOT_FOUND");
        assert_eq!(ErrorCode::DuplicateProvider.as_str(), "DUPLICATE_PROVIDER");
        assert_eq!(ErrorCode::ParameterRequired.as_str(), "PARAMETER_REQUIRED");
        assert_eq!(ErrorCode::ParameterInvalid.as_str(), "PARAMETER_INVALID");
        assert_eq!(
            ErrorCode::SchemaValidationFailed.as_str(),
            "SCHEMA_VALIDATION_FAILED"
        );
        assert_eq!(ErrorCode::AuthFailed.as_str(), "AUTH_FAILED");
    }

    #[test]
    fn test_serde_matches_as_str() {
        let json = serde_json::to_string(&ErrorCode::PermissionDenied).unwrap();
        assert_eq!(json, "\"PERMISSION_DENIED\"");
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::PermissionDenied);
    }

    #[test]
    fn test_internal_detail_never_reaches_clients() {
        let err = HostlinkError::Internal("stack trace with secrets".to_string());
        assert_eq!(err.client_message(), "internal error");
        assert_eq!(err.code(), ErrorCode::InternalError);

        let err = HostlinkError::PermissionDenied("missing p1".to_string());
        assert!(err.client_message().contains("missing p1"));
    }
}
