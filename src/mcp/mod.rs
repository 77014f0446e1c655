//! MCP-style HTTP tool transport: capability-to-tool projection and the
//! discovery/invocation endpoints.

pub mod routes;
pub mod tool;

pub use routes::{mcp_router, McpState};
pub use tool::{
    decorate, decorate_all, to_tool_result, ContentBlock, McpTool, McpToolResult, ToolAnnotations,
};
