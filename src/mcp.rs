//! MCP (Model Context Protocol) handling module
//!
//! This module implements the JSON-RPC 2.0 protocol for MCP communication.
//! Requests are handled strictly one at a time.

use crate::error::AppError;
use crate::service::MetricsService;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader as AsyncBufReader};
use tracing::{debug, error, info};

/// Server name reported during initialization
pub const SERVER_NAME: &str = "insights-metrics";

/// URI of the full metrics collection resource
pub const METRICS_RESOURCE_URI: &str = "mcp://insights-metrics/metrics.json";

/// MCP JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
pub struct McpRequest {
    /// JSON-RPC version field, required on the wire but never read
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

impl McpRequest {
    /// Notifications carry no id and never get a response
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.starts_with("notifications/")
    }
}

/// MCP JSON-RPC 2.0 response structure
#[derive(Debug, Serialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP Error structure
#[derive(Debug, Serialize)]
pub struct McpError {
    pub code: String,
    pub message: String,
}

/// MCP Tool call arguments
#[derive(Debug, Deserialize)]
pub struct ToolCallArgs {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Resource read arguments
#[derive(Debug, Deserialize)]
pub struct ResourceReadArgs {
    #[serde(default)]
    pub uri: String,
}

/// MCP Content item
#[derive(Debug, Serialize)]
pub struct ContentItem {
    pub r#type: String,
    pub text: String,
}

/// MCP Tool result
#[derive(Debug, Serialize)]
pub struct ToolResult {
    pub content: Vec<ContentItem>,
}

impl McpResponse {
    /// Create a successful response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: &str, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }

    /// Create an error response from an application error
    pub fn from_app_error(id: Option<Value>, err: &AppError) -> Self {
        Self::error(id, err.error_code(), &err.message())
    }

    /// Wrap the outcome of a tool execution
    pub fn from_tool_result(id: Option<Value>, result: Result<ToolResult, AppError>) -> Self {
        match result.and_then(|tool_result| serde_json::to_value(tool_result).map_err(AppError::from)) {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::from_app_error(id, &e),
        }
    }
}

impl ToolResult {
    /// Create a text result
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(content)],
        }
    }

    /// Create a text result holding pretty-printed JSON
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, AppError> {
        let text = serde_json::to_string_pretty(payload)
            .map_err(|e| AppError::Internal(format!("Failed to serialize result: {}", e)))?;
        Ok(Self::text(text))
    }

    /// First text content, as printed in CLI mode
    pub fn first_text(&self) -> String {
        self.content.first().map(|c| c.text.clone()).unwrap_or_default()
    }
}

impl ContentItem {
    /// Helper to create plain text content
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            r#type: "text".to_string(),
            text: content.into(),
        }
    }
}

/// Parse MCP request from JSON string
pub fn parse_request(json: &str) -> Result<McpRequest> {
    let request: McpRequest = serde_json::from_str(json)?;
    Ok(request)
}

/// Serialize MCP response to JSON string
pub fn serialize_response(response: &McpResponse) -> Result<String> {
    Ok(serde_json::to_string(response)?)
}

/// Handle stdio MCP communication
pub async fn handle_stdio(service: &mut MetricsService) -> Result<()> {
    info!("Starting {} MCP server on stdio", SERVER_NAME);
    let stdin = AsyncBufReader::new(tokio::io::stdin());
    serve(stdin, tokio::io::stdout(), service).await
}

/// Serve newline-delimited JSON-RPC from `reader`, writing responses to `writer`.
///
/// Lines are read as raw bytes, so a line that is not UTF-8 gets a
/// `parse_error` response instead of ending the loop.
pub async fn serve<R, W>(mut reader: R, mut writer: W, service: &mut MetricsService) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let Some(response) = respond_to_line(&buf, service) else {
            continue;
        };

        let response_json = serialize_response(&response)?;
        debug!("Sending response: {}", response_json);

        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    info!("Input closed, shutting down");
    Ok(())
}

/// Answer one raw input line; blank lines and notifications get no response
fn respond_to_line(raw: &[u8], service: &mut MetricsService) -> Option<McpResponse> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            error!("Request is not valid UTF-8: {}", e);
            return Some(McpResponse::error(
                None,
                "parse_error",
                &format!("Invalid UTF-8 in request: {}", e),
            ));
        }
    };
    if line.is_empty() {
        return None;
    }
    debug!("Received request: {}", line);

    match parse_request(line) {
        Ok(request) if request.is_notification() => {
            debug!("Notification {}", request.method);
            None
        }
        Ok(request) => Some(handle_request(request, service)),
        Err(e) => {
            error!("Failed to parse request: {}", e);
            Some(McpResponse::error(None, "parse_error", &format!("Invalid JSON: {}", e)))
        }
    }
}

/// Handle a single MCP request
pub fn handle_request(request: McpRequest, service: &mut MetricsService) -> McpResponse {
    match request.method.as_str() {
        "initialize" => handle_initialize(request),
        "ping" => McpResponse::success(request.id, json!({})),
        "tools/list" => McpResponse::success(request.id, json!({ "tools": build_tools_array() })),
        "tools/call" => handle_tool_call(request, service),
        "resources/list" => McpResponse::success(request.id, json!({ "resources": build_resources_array() })),
        "resources/read" => handle_resource_read(request, service),
        _ => McpResponse::error(
            request.id,
            "method_not_found",
            &format!("Method '{}' not found", request.method),
        ),
    }
}

/// Handle tools/call method
fn handle_tool_call(request: McpRequest, service: &mut MetricsService) -> McpResponse {
    let args: ToolCallArgs = match serde_json::from_value(request.params.unwrap_or_default()) {
        Ok(args) => args,
        Err(e) => {
            return McpResponse::error(
                request.id,
                "invalid_params",
                &format!("Invalid parameters: {}", e),
            )
        }
    };

    debug!("Tool call: {}", args.name);
    match args.name.as_str() {
        "metrics.list" => crate::tools::list::handle_list(request.id, service),
        "metrics.get" => crate::tools::get::handle_get(request.id, args.arguments, service),
        "metrics.search" => crate::tools::search::handle_search(request.id, args.arguments, service),
        "metrics.refreshNow" => crate::tools::refresh::handle_refresh(request.id, service),
        _ => McpResponse::error(
            request.id,
            "tool_not_found",
            &format!("Tool '{}' not found", args.name),
        ),
    }
}

/// Handle resources/read method
fn handle_resource_read(request: McpRequest, service: &mut MetricsService) -> McpResponse {
    let args: ResourceReadArgs = match serde_json::from_value(request.params.unwrap_or_else(|| json!({}))) {
        Ok(args) => args,
        Err(e) => {
            return McpResponse::error(
                request.id,
                "invalid_params",
                &format!("Invalid parameters: {}", e),
            )
        }
    };

    if args.uri.trim().is_empty() {
        let err = AppError::MissingParameter("uri parameter is required".to_string());
        return McpResponse::from_app_error(request.id, &err);
    }
    if args.uri != METRICS_RESOURCE_URI {
        let err = AppError::NotFound(format!("Unknown resource: {}", args.uri));
        return McpResponse::from_app_error(request.id, &err);
    }

    let text = service
        .collection()
        .and_then(|file| serde_json::to_string_pretty(file).map_err(AppError::from));
    match text {
        Ok(text) => McpResponse::success(
            request.id,
            json!({
                "contents": [{
                    "uri": args.uri,
                    "mimeType": "application/json",
                    "text": text
                }]
            }),
        ),
        Err(e) => McpResponse::from_app_error(request.id, &e),
    }
}

/// Handle initialize method
fn handle_initialize(request: McpRequest) -> McpResponse {
    let protocol_version = request
        .params
        .as_ref()
        .and_then(|p| p.get("protocolVersion"))
        .cloned()
        .unwrap_or_else(|| json!("2024-11-05"));

    let result = json!({
        "protocolVersion": protocol_version,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false }
        },
        "tools": build_tools_array()
    });
    McpResponse::success(request.id, result)
}

/// Build the tools array returned from tools/list and initialize
pub fn build_tools_array() -> Value {
    use crate::cli::{GetArgs, SearchArgs};
    use schemars::schema_for;

    // Generate JSON schemas from the CLI argument structs
    let get_schema = schema_for!(GetArgs);
    let search_schema = schema_for!(SearchArgs);
    let no_args = json!({ "type": "object", "properties": {} });

    json!([
        {
            "name": "metrics.list",
            "description": "Returns a list of all metrics with basic information",
            "inputSchema": no_args
        },
        {
            "name": "metrics.get",
            "description": "Returns full details of a metric by exact name",
            "inputSchema": get_schema
        },
        {
            "name": "metrics.search",
            "description": "Performs fuzzy search over metrics by name, description, tags or level",
            "inputSchema": search_schema
        },
        {
            "name": "metrics.refreshNow",
            "description": "Re-extracts metrics from the reference document and reloads the in-memory cache",
            "inputSchema": no_args
        }
    ])
}

/// Build the resources array returned from resources/list
pub fn build_resources_array() -> Value {
    json!([
        {
            "uri": METRICS_RESOURCE_URI,
            "name": "Insights metrics",
            "description": "Complete JSON collection of all extracted metric definitions",
            "mimeType": "application/json"
        }
    ])
}
