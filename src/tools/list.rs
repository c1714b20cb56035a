//! List tool implementation
//!
//! Implements the `metrics.list` MCP tool

use crate::cli::ListArgs;
use crate::error::AppError;
use crate::mcp::{McpResponse, ToolResult};
use crate::service::MetricsService;
use serde_json::Value;
use tracing::debug;

/// Handle list tool call
pub fn handle_list(id: Option<Value>, service: &mut MetricsService) -> McpResponse {
    McpResponse::from_tool_result(id, execute_list(ListArgs::default(), service))
}

/// Execute list tool (shared implementation for MCP and CLI)
///
/// The MCP tool takes no arguments and always lists everything; filters come from the CLI.
pub fn execute_list(args: ListArgs, service: &mut MetricsService) -> Result<ToolResult, AppError> {
    let summaries = service.list_filtered(&args.filter())?;
    debug!("Listing {} metrics", summaries.len());
    ToolResult::json(&summaries)
}
