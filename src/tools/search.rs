//! Search tool implementation
//!
//! Implements the `metrics.search(q, limit)` MCP tool

use super::parse_args;
use crate::cli::SearchArgs;
use crate::error::AppError;
use crate::mcp::{McpResponse, ToolResult};
use crate::service::MetricsService;
use serde_json::Value;
use tracing::{debug, info};

/// Handle search tool call
pub fn handle_search(id: Option<Value>, args: Value, service: &mut MetricsService) -> McpResponse {
    let result = parse_args::<SearchArgs>(args).and_then(|args| execute_search(args, service));
    McpResponse::from_tool_result(id, result)
}

/// Execute search tool (shared implementation for MCP and CLI)
pub fn execute_search(args: SearchArgs, service: &MetricsService) -> Result<ToolResult, AppError> {
    let limit = args.effective_limit();
    info!("Search request: '{}' (limit {})", args.q.trim(), limit);

    let results = service.search(&args.q, limit)?;
    debug!("Search returned {} results", results.len());
    ToolResult::json(&results)
}
