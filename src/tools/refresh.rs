//! Refresh tool implementation
//!
//! Implements the `metrics.refreshNow` MCP tool

use crate::cli::RefreshArgs;
use crate::error::AppError;
use crate::mcp::{McpResponse, ToolResult};
use crate::service::MetricsService;
use serde_json::Value;
use tracing::{info, warn};

/// Handle refresh tool call
pub fn handle_refresh(id: Option<Value>, service: &mut MetricsService) -> McpResponse {
    McpResponse::from_tool_result(id, execute_refresh(RefreshArgs::default(), service))
}

/// Execute refresh tool (shared implementation for MCP and CLI)
pub fn execute_refresh(args: RefreshArgs, service: &mut MetricsService) -> Result<ToolResult, AppError> {
    info!("Refresh requested");
    let count = service.refresh_as_of(args.as_of).map_err(|e| {
        warn!("Refresh failed: {}", e);
        e
    })?;

    let summary = service.summary()?;
    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|e| AppError::Internal(format!("Failed to serialize summary: {}", e)))?;

    Ok(ToolResult::text(format!(
        "Metrics refreshed successfully. {} metrics loaded.\n\n{}",
        count, summary_json
    )))
}
