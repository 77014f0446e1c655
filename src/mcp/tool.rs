//! Projection of capability manifests into MCP-style tool definitions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::capability::{CapabilityManifest, CapabilityType};
use crate::core::execution::CapabilityResponse;
use crate::errors::HostlinkError;

static TOOL_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]{1,128}$").unwrap()
});

/// Behavior hints derived from the capability type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub read_only_hint: bool,
    pub destructive_hint: bool,
    pub idempotent_hint: bool,
}

impl ToolAnnotations {
    fn for_type(capability_type: CapabilityType) -> Self {
        Self {
            read_only_hint: capability_type == CapabilityType::Context,
            destructive_hint: capability_type == CapabilityType::Action,
            idempotent_hint: capability_type != CapabilityType::Action,
        }
    }
}

/// A tool entry as exposed over the tool-listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    pub title: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    pub annotations: ToolAnnotations,
}

/// One piece of tool result content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

/// The wire shape of a tool invocation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    pub is_error: bool,
}

impl McpToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
        }
    }

    pub fn structured(text: impl Into<String>, structured: Value) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            structured_content: Some(structured),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            structured_content: None,
            is_error: true,
        }
    }
}

/// Project one capability manifest into a tool definition.
///
/// Fails with `InvalidName` when the capability id cannot serve as a tool
/// name.
pub fn decorate(manifest: &CapabilityManifest) -> Result<McpTool, HostlinkError> {
    if !TOOL_NAME_RE.is_match(&manifest.id) {
        return Err(HostlinkError::InvalidName(manifest.id.clone()));
    }

    Ok(McpTool {
        name: manifest.id.clone(),
        title: manifest.id.clone(),
        description: manifest.description.clone(),
        input_schema: manifest
            .parameter_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object"})),
        output_schema: manifest.return_schema.clone(),
        annotations: ToolAnnotations::for_type(manifest.capability_type),
    })
}

/// Project a whole catalog, skipping (and logging) entries that cannot be
/// named as tools.
pub fn decorate_all(manifests: &[CapabilityManifest]) -> Vec<McpTool> {
    manifests
        .iter()
        .filter_map(|manifest| match decorate(manifest) {
            Ok(tool) => Some(tool),
            Err(err) => {
                tracing::warn!(
                    capability_id = %manifest.id,
                    error = %err,
                    "skipping capability unfit for tool exposure"
                );
                None
            }
        })
        .collect()
}

/// Convert a capability response into the tool result wire shape.
pub fn to_tool_result(response: &CapabilityResponse) -> McpToolResult {
    if !response.success {
        let message = match (&response.error_code, &response.error_message) {
            (Some(code), Some(message)) => format!("{}: {message}", code.as_str()),
            (Some(code), None) => code.as_str().to_string(),
            _ => "capability invocation failed".to_string(),
        };
        return McpToolResult::error(message);
    }

    match &response.data {
        None | Some(Value::Null) => McpToolResult::text("ok"),
        Some(Value::String(text)) => McpToolResult::text(text.clone()),
        Some(object @ Value::Object(_)) => {
            let text = serde_json::to_string(object).unwrap_or_else(|_| object.to_string());
            McpToolResult::structured(text, object.clone())
        }
        Some(other) => McpToolResult::text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capability::{CapabilityDescriptor, CapabilityHandler};
    use crate::errors::ErrorCode;
    use std::sync::Arc;

    fn noop() -> CapabilityHandler {
        Arc::new(|_| Box::pin(async { Ok(Value::Null) }))
    }

    fn manifest(id: &str, capability_type: CapabilityType) -> CapabilityManifest {
        CapabilityDescriptor::new(id, capability_type, noop())
            .with_description("test capability")
            .manifest()
    }

    #[test]
    fn test_decorate_carries_schema_and_hints() {
        let manifest = CapabilityDescriptor::new("world.time.get", CapabilityType::Context, noop())
            .with_parameter_schema(json!({"type": "object", "properties": {}}))
            .manifest();

        let tool = decorate(&manifest).unwrap();
        assert_eq!(tool.name, "world.time.get");
        assert_eq!(tool.input_schema["type"], "object");
        assert!(tool.annotations.read_only_hint);
        assert!(!tool.annotations.destructive_hint);
        assert!(tool.annotations.idempotent_hint);
    }

    #[test]
    fn test_action_hints() {
        let tool = decorate(&manifest("world.time.set", CapabilityType::Action)).unwrap();
        assert!(!tool.annotations.read_only_hint);
        assert!(tool.annotations.destructive_hint);
        assert!(!tool.annotations.idempotent_hint);
    }

    #[test]
    fn test_missing_schema_defaults_to_object() {
        let tool = decorate(&manifest("a.b", CapabilityType::Context)).unwrap();
        assert_eq!(tool.input_schema, json!({"type": "object"}));
    }

    #[test]
    fn test_invalid_names_rejected() {
        for bad in ["", "has space", "emoji✨", &"x".repeat(129)] {
            let result = decorate(&manifest(bad, CapabilityType::Context));
            assert!(matches!(result, Err(HostlinkError::InvalidName(_))), "{bad:?}");
        }
    }

    #[test]
    fn test_decorate_all_skips_bad_entries() {
        let manifests = vec![
            manifest("good.one", CapabilityType::Context),
            manifest("bad name", CapabilityType::Context),
            manifest("good.two", CapabilityType::Action),
        ];
        let tools = decorate_all(&manifests);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "good.one");
        assert_eq!(tools[1].name, "good.two");
    }

    #[test]
    fn test_object_result_is_structured() {
        let response = CapabilityResponse::ok(Some(json!({"time": 6000})));
        let result = to_tool_result(&response);
        assert!(!result.is_error);
        assert_eq!(result.structured_content, Some(json!({"time": 6000})));
        let ContentBlock::Text { text } = &result.content[0];
        assert!(text.contains("6000"));
    }

    #[test]
    fn test_string_and_null_results() {
        let result = to_tool_result(&CapabilityResponse::ok(Some(json!("done"))));
        let ContentBlock::Text { text } = &result.content[0];
        assert_eq!(text, "done");
        assert!(result.structured_content.is_none());

        let result = to_tool_result(&CapabilityResponse::ok(None));
        let ContentBlock::Text { text } = &result.content[0];
        assert_eq!(text, "ok");
    }

    #[test]
    fn test_error_result_carries_code() {
        let err = HostlinkError::CapabilityNotFound("ghost".to_string());
        let result = to_tool_result(&CapabilityResponse::error(&err));
        assert!(result.is_error);
        let ContentBlock::Text { text } = &result.content[0];
        assert!(text.contains(ErrorCode::CapabilityNotFound.as_str()));
    }
}
