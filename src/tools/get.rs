//! Get tool implementation
//!
//! Implements the `metrics.get(name)` MCP tool

use super::parse_args;
use crate::cli::GetArgs;
use crate::error::AppError;
use crate::mcp::{McpResponse, ToolResult};
use crate::service::MetricsService;
use serde_json::Value;
use tracing::info;

/// Handle get tool call
pub fn handle_get(id: Option<Value>, args: Value, service: &mut MetricsService) -> McpResponse {
    let result = parse_args::<GetArgs>(args).and_then(|args| execute_get(args, service));
    McpResponse::from_tool_result(id, result)
}

/// Execute get tool (shared implementation for MCP and CLI)
pub fn execute_get(args: GetArgs, service: &mut MetricsService) -> Result<ToolResult, AppError> {
    info!("Get request for metric: {}", args.name.trim());
    let metric = service.get(&args.name)?;
    ToolResult::json(&metric)
}
