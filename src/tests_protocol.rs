//! End-to-end tests for the stdio JSON-RPC loop

use crate::mcp::{serve, METRICS_RESOURCE_URI};
use crate::service::tests::{service_with, REFERENCE};
use crate::service::MetricsService;
use serde_json::{json, Value};

/// Feed newline-delimited requests through the server and collect every response line
async fn exchange(service: &mut MetricsService, requests: &[Value]) -> Vec<Value> {
    let mut input = String::new();
    for request in requests {
        input.push_str(&request.to_string());
        input.push('\n');
    }
    exchange_raw(service, input.as_bytes()).await
}

async fn exchange_raw(service: &mut MetricsService, input: &[u8]) -> Vec<Value> {
    let mut output: Vec<u8> = Vec::new();
    serve(input, &mut output, service).await.unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn ready_service() -> MetricsService {
    let (mut service, _, _) = service_with(Some(REFERENCE));
    service.startup(false).unwrap();
    service
}

fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

#[tokio::test]
async fn test_initialize_and_notifications() {
    let mut service = ready_service();
    let responses = exchange(
        &mut service,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2024-11-05"}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "insights-metrics");
    assert!(responses[0]["result"]["capabilities"]["resources"].is_object());
    assert_eq!(responses[1]["id"], 2);
}

#[tokio::test]
async fn test_tools_list_has_four_tools_with_schemas() {
    let mut service = ready_service();
    let responses = exchange(
        &mut service,
        &[json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})],
    )
    .await;

    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["metrics.list", "metrics.get", "metrics.search", "metrics.refreshNow"]);

    let search_schema = &tools[2]["inputSchema"];
    assert!(search_schema["properties"]["q"].is_object());
    assert!(search_schema["properties"]["limit"].is_object());
    assert_eq!(search_schema["required"], json!(["q"]));
}

#[tokio::test]
async fn test_tool_calls_round_trip() {
    let mut service = ready_service();
    let responses = exchange(
        &mut service,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "metrics.list"}}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "metrics.get", "arguments": {"name": "page_fans"}}}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "metrics.search", "arguments": {"q": "earnigs", "limit": 2}}}),
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "metrics.refreshNow", "arguments": {}}}),
        ],
    )
    .await;

    let list: Value = serde_json::from_str(tool_text(&responses[0])).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 3);

    let metric: Value = serde_json::from_str(tool_text(&responses[1])).unwrap();
    assert_eq!(metric["name"], "page_fans");
    assert_eq!(metric["periods"], json!(["lifetime"]));

    let results: Value = serde_json::from_str(tool_text(&responses[2])).unwrap();
    assert_eq!(results[0]["item"]["name"], "content_monetization_earnings");

    assert!(tool_text(&responses[3]).contains("3 metrics"));
}

#[tokio::test]
async fn test_protocol_errors() {
    let mut service = ready_service();
    let input = [
        "{not json".to_string(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "bogus/method"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "metrics.delete"}}).to_string(),
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "metrics.get", "arguments": {"name": "missing_metric"}}}).to_string(),
        json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "metrics.search", "arguments": {"q": "   "}}}).to_string(),
    ]
    .join("\n");

    let responses = exchange_raw(&mut service, input.as_bytes()).await;
    let codes: Vec<&str> = responses
        .iter()
        .map(|r| r["error"]["code"].as_str().unwrap())
        .collect();
    assert_eq!(
        codes,
        ["parse_error", "method_not_found", "tool_not_found", "not_found", "missing_parameter"]
    );
    assert!(responses[0]["id"].is_null());
    assert!(responses[3]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Metric not found: missing_metric"));
}

#[tokio::test]
async fn test_resources() {
    let mut service = ready_service();
    let responses = exchange(
        &mut service,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read", "params": {"uri": METRICS_RESOURCE_URI}}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/read", "params": {"uri": "mcp://insights-metrics/other.json"}}),
        ],
    )
    .await;

    assert_eq!(responses[0]["result"]["resources"][0]["uri"], METRICS_RESOURCE_URI);

    let contents = &responses[1]["result"]["contents"][0];
    assert_eq!(contents["mimeType"], "application/json");
    let collection: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert!(collection["version"].as_str().unwrap().starts_with("v23.0."));
    assert_eq!(collection["updatedAt"], "2025-01-15T00:00:00Z");
    assert_eq!(collection["metrics"].as_array().unwrap().len(), 3);

    assert_eq!(responses[2]["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_serving() {
    let mut service = ready_service();
    let mut input = Vec::new();
    input.extend_from_slice(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string().as_bytes());
    input.extend_from_slice(b"\n\xff\xfe\n");
    input.extend_from_slice(json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}).to_string().as_bytes());
    input.push(b'\n');

    let responses = exchange_raw(&mut service, &input).await;
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["error"]["code"], "parse_error");
    assert!(responses[1]["id"].is_null());
    assert_eq!(responses[2]["id"], 3);
    assert!(responses[2]["result"].is_object());
}

#[tokio::test]
async fn test_last_line_without_newline_is_served() {
    let mut service = ready_service();
    let input = json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}).to_string();
    let responses = exchange_raw(&mut service, input.as_bytes()).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 9);
}
