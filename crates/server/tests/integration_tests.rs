use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use broker_core::{Config, ToolGroup, ToolGroupId};
use futures::StreamExt;
use serde_json::{json, Value};
use server::{create_app, AppState};
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Stand-in remote provider speaking both wire styles.
fn provider(open_streams: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/rpc",
            post(|Json(body): Json<Value>| async move {
                if body["method"] == "tools/list" {
                    return Json(json!({
                        "jsonrpc": "2.0",
                        "id": body["id"],
                        "result": {"tools": [{
                            "name": "subtract",
                            "description": "Subtract b from a",
                            "inputSchema": {"type": "object", "required": ["a", "b"]}
                        }]}
                    }));
                }
                let a = body["params"]["arguments"]["a"].as_i64().unwrap_or(0);
                let b = body["params"]["arguments"]["b"].as_i64().unwrap_or(0);
                Json(json!({"jsonrpc": "2.0", "id": body["id"], "result": {"result": a - b}}))
            }),
        )
        .route(
            "/sse/silent",
            post(move || {
                let open_streams = Arc::clone(&open_streams);
                async move {
                    let guard = OpenStream::new(&open_streams);
                    Sse::new(stream! {
                        let _guard = guard;
                        loop {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            yield Ok::<_, Infallible>(Event::default().event("progress").data("{}"));
                        }
                    })
                    .keep_alive(KeepAlive::new().interval(Duration::from_millis(20)))
                }
            }),
        )
}

async fn spawn_broker(config: &Config) -> SocketAddr {
    spawn(create_app(AppState::from_config(config).unwrap())).await
}

#[tokio::test]
async fn should_load_config_file_and_serve_configured_groups() {
    let provider_addr = spawn(provider(Arc::default())).await;
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[server]
bind_addr = "127.0.0.1:0"

[transport]
request_timeout_ms = 2000

[[toolgroups]]
identifier = "tools::math"
provider_id = "math"

[[toolgroups]]
identifier = "rest::calc"
provider_id = "calc-http"
mcp_endpoint = {{ uri = "http://{provider_addr}/rpc", transport = "request_response" }}
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    let addr = spawn_broker(&config).await;
    let client = reqwest::Client::new();

    let groups: Value = client
        .get(format!("http://{addr}/toolgroups"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(groups.as_array().unwrap().len(), 2);
    assert_eq!(groups[1]["identifier"], "rest::calc");

    let local: Value = client
        .post(format!("http://{addr}/invoke"))
        .json(&json!({"tool_group_id": "tools::math", "tool_name": "add", "arguments": {"a": 2, "b": 3}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(local["payload"]["result"], 5);

    let remote: Value = client
        .post(format!("http://{addr}/invoke"))
        .json(&json!({"tool_group_id": "rest::calc", "tool_name": "subtract", "arguments": {"a": 10, "b": 4}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(remote["status"], "success");
    assert_eq!(remote["payload"]["result"], 6);

    let remote_tools: Value = client
        .get(format!("http://{addr}/toolgroups/rest::calc/tools"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(remote_tools[0]["name"], "subtract");
    assert_eq!(remote_tools[0]["parameters"]["required"], json!(["a", "b"]));
}

#[tokio::test]
async fn should_report_listing_timeout_as_gateway_timeout() {
    let provider_addr = spawn(provider(Arc::default())).await;
    let mut config = Config::default();
    config.transport.stream_timeout_ms = 200;
    config.toolgroups.push(ToolGroup::remote(
        ToolGroupId::parse("mcp::docling").unwrap(),
        "model-context-protocol",
        broker_core::Endpoint::streaming_event(format!("http://{provider_addr}/sse/silent")),
    ));
    let addr = spawn_broker(&config).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/toolgroups/mcp::docling/tools"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 504);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "Timeout");
}

#[tokio::test]
async fn should_report_timeout_through_http_invoke() {
    let provider_addr = spawn(provider(Arc::default())).await;
    let mut config = Config::default();
    config.transport.stream_timeout_ms = 200;
    config.toolgroups.push(ToolGroup::remote(
        ToolGroupId::parse("mcp::docling").unwrap(),
        "model-context-protocol",
        broker_core::Endpoint::streaming_event(format!("http://{provider_addr}/sse/silent")),
    ));
    let addr = spawn_broker(&config).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/invoke"))
        .json(&json!({"tool_group_id": "mcp::docling", "tool_name": "convert_document"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "failure");
    assert_eq!(body["kind"], "Timeout");
}

#[tokio::test]
async fn should_cancel_remote_call_when_stream_client_disconnects() {
    let open_streams = Arc::new(AtomicUsize::new(0));
    let provider_addr = spawn(provider(Arc::clone(&open_streams))).await;
    let mut config = Config::default();
    config.transport.stream_timeout_ms = 60_000;
    let addr = spawn_broker(&config).await;
    let client = reqwest::Client::new();

    let registered = client
        .post(format!("http://{addr}/toolgroups"))
        .json(&json!({
            "identifier": "mcp::docling",
            "provider_id": "model-context-protocol",
            "mcp_endpoint": {"uri": format!("http://{provider_addr}/sse/silent"), "transport": "streaming_event"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(registered.status(), 201);

    let response = client
        .post(format!("http://{addr}/invoke/stream"))
        .json(&json!({"tool_group_id": "mcp::docling", "tool_name": "convert_document"}))
        .send()
        .await
        .unwrap();
    let mut body = response.bytes_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("call_started"));

    let opened = tokio::time::timeout(Duration::from_secs(5), async {
        while open_streams.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(opened.is_ok(), "broker never reached the provider");

    drop(body);

    // The broker notices the disconnect on its next keep-alive write.
    let released = tokio::time::timeout(Duration::from_secs(15), async {
        while open_streams.load(Ordering::SeqCst) != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "provider stream still open after client left");
}
