//! JSON-RPC 2.0 envelope used by both remote transports to carry
//! `tools/call` and `tools/list` requests and their responses.

use crate::error::{TransportError, TransportResult};
use broker_core::{Arguments, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tooling::ToolSpec;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Upper bound on `tools/list` pages followed through `nextCursor`.
pub const LIST_PAGES_MAX: usize = 32;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest<P = ToolCallParams> {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: P,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Arguments,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListToolsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl RpcRequest {
    pub fn tools_call(name: &str, arguments: Arguments) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: next_id(),
            method: METHOD_TOOLS_CALL.to_string(),
            params: ToolCallParams {
                name: name.to_string(),
                arguments,
            },
        }
    }
}

impl RpcRequest<ListToolsParams> {
    pub fn tools_list(cursor: Option<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: next_id(),
            method: METHOD_TOOLS_LIST.to_string(),
            params: ListToolsParams { cursor },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One page of a `tools/list` result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPage {
    pub tools: Vec<ToolSpec>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    tools: Vec<RemoteTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

impl From<RemoteTool> for ToolSpec {
    fn from(tool: RemoteTool) -> Self {
        ToolSpec {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            parameters: tool
                .input_schema
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        }
    }
}

impl RpcResponse {
    /// Resolves the envelope's `result` or `error`, whichever is present.
    /// Exactly one of them must be.
    fn into_result(self, method: &str, tool: &str) -> TransportResult<Value> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(TransportError::ToolFailed {
                tool: tool.to_string(),
                message: format!("{} (code {})", error.message, error.code),
            }),
            (Some(_), Some(_)) => Err(TransportError::protocol(format!(
                "{method} response carries both result and error"
            ))),
            (None, None) => Err(TransportError::protocol(format!(
                "{method} response carries neither result nor error"
            ))),
        }
    }

    pub fn into_payload(self, tool: &str) -> TransportResult<Payload> {
        let result = self.into_result(METHOD_TOOLS_CALL, tool)?;
        decode_tool_result(result, tool)
    }

    pub fn into_tool_page(self) -> TransportResult<ToolPage> {
        let result = self.into_result(METHOD_TOOLS_LIST, METHOD_TOOLS_LIST)?;
        decode_tool_page(result)
    }
}

/// Decodes a `tools/call` result. A result flagged `isError` is the
/// provider reporting that the tool itself failed.
pub fn decode_tool_result(value: Value, tool: &str) -> TransportResult<Payload> {
    let is_error = value.get("isError").and_then(Value::as_bool) == Some(true);
    let payload =
        Payload::from_value(value).map_err(|e| TransportError::protocol(e.to_string()))?;

    if is_error {
        return Err(TransportError::ToolFailed {
            tool: tool.to_string(),
            message: payload
                .text_content()
                .unwrap_or_else(|| "provider reported an error without details".to_string()),
        });
    }
    Ok(payload)
}

pub fn decode_tool_page(value: Value) -> TransportResult<ToolPage> {
    let result: ListToolsResult = serde_json::from_value(value)
        .map_err(|e| TransportError::protocol(format!("malformed tools/list result: {e}")))?;
    Ok(ToolPage {
        tools: result.tools.into_iter().map(ToolSpec::from).collect(),
        next_cursor: result.next_cursor.filter(|cursor| !cursor.is_empty()),
    })
}

/// Follows `nextCursor` until the listing is complete.
pub async fn collect_tool_pages<F, Fut>(mut fetch: F) -> TransportResult<Vec<ToolSpec>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = TransportResult<ToolPage>>,
{
    let mut tools = Vec::new();
    let mut cursor = None;

    for _ in 0..LIST_PAGES_MAX {
        let page = fetch(cursor.take()).await?;
        tools.extend(page.tools);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(tools),
        }
    }

    Err(TransportError::protocol(format!(
        "tools/list still paginating after {LIST_PAGES_MAX} pages"
    )))
}

/// Parses a JSON-RPC response body.
pub fn parse_response(body: &[u8]) -> TransportResult<RpcResponse> {
    let response: RpcResponse = serde_json::from_slice(body)
        .map_err(|e| TransportError::protocol(format!("undecodable response body: {e}")))?;

    if response.jsonrpc != JSONRPC_VERSION {
        return Err(TransportError::protocol(format!(
            "unsupported jsonrpc version '{}'",
            response.jsonrpc
        )));
    }
    Ok(response)
}
