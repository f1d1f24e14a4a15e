use crate::error::{TransportError, TransportResult};
use crate::rpc::{self, RpcRequest, RpcResponse, ToolPage, JSONRPC_VERSION, METHOD_TOOLS_LIST};
use crate::sse::{EventParser, SseEvent, EVENT_BYTES_MAX};
use crate::{remote_endpoint, CallContext, Transport};
use async_trait::async_trait;
use broker_core::{Endpoint, Payload, ToolGroup, TransportKind};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tooling::ToolSpec;
use tracing::{debug, trace, warn};

pub const EVENT_RESULT: &str = "result";
pub const EVENT_ERROR: &str = "error";

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Open-stream counter; each in-flight call holds one [`StreamGuard`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionGauge {
    open: Arc<AtomicUsize>,
}

impl ConnectionGauge {
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> StreamGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        StreamGuard {
            open: Arc::clone(&self.open),
        }
    }
}

struct StreamGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// POSTs the call, then consumes server-sent events until a terminal
/// `result` or `error` event arrives.
pub struct StreamingEventTransport {
    client: Client,
    timeout: Duration,
    gauge: ConnectionGauge,
    event_limit: usize,
}

impl StreamingEventTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(Client::new(), timeout)
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            gauge: ConnectionGauge::default(),
            event_limit: EVENT_BYTES_MAX,
        }
    }

    /// Caps the size of any single event, terminal or not.
    pub fn with_event_limit(mut self, bytes: usize) -> Self {
        self.event_limit = bytes;
        self
    }

    /// Number of event streams currently held open.
    pub fn active_streams(&self) -> usize {
        self.gauge.open()
    }

    pub fn gauge(&self) -> ConnectionGauge {
        self.gauge.clone()
    }

    /// Runs `work` under the stream timeout, aborting on cancellation.
    /// Dropping `work` closes its connection and releases the stream guard.
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        work: impl Future<Output = TransportResult<T>>,
    ) -> TransportResult<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, work) => {
                outcome.unwrap_or(Err(TransportError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }))
            }
        }
    }

    async fn await_terminal<P: Serialize>(
        &self,
        endpoint: &Endpoint,
        body: &RpcRequest<P>,
    ) -> TransportResult<SseEvent> {
        let _guard = self.gauge.acquire();

        let url = reqwest::Url::parse(&endpoint.uri).map_err(|e| {
            TransportError::transport(format!("invalid endpoint uri '{}': {e}", endpoint.uri))
        })?;

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);
        for (name, value) in &endpoint.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(uri = %endpoint.uri, %status, "event endpoint returned non-success status");
            return Err(TransportError::transport(format!(
                "endpoint responded with HTTP {status}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut parser = EventParser::with_limit(self.event_limit);
        // holds at most an incomplete UTF-8 sequence between chunks
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::transport(e.to_string()))?;
            pending.extend_from_slice(&chunk);
            let text = take_utf8_prefix(&mut pending)?;

            let events = parser
                .feed(&text)
                .map_err(|e| TransportError::protocol(e.to_string()))?;
            for event in events {
                if is_terminal(&event) {
                    return Ok(event);
                }
                trace!(event = %event.event, "skipping non-terminal event");
            }
        }

        Err(TransportError::protocol(
            "event stream closed before a terminal event",
        ))
    }

    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        cursor: Option<String>,
    ) -> TransportResult<ToolPage> {
        let event = self
            .await_terminal(endpoint, &RpcRequest::tools_list(cursor))
            .await?;
        if event.event == EVENT_ERROR {
            return decode_error(&event.data, METHOD_TOOLS_LIST);
        }
        match parse_result_data(&event.data)? {
            ResultData::Envelope(response) => response.into_tool_page(),
            ResultData::Bare(value) => rpc::decode_tool_page(value),
        }
    }
}

/// Splits off the longest valid UTF-8 prefix, keeping an incomplete trailing
/// sequence for the next chunk.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> TransportResult<String> {
    let valid_up_to = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            return Err(TransportError::protocol(format!(
                "event stream is not valid UTF-8: {e}"
            )))
        }
    };
    let rest = pending.split_off(valid_up_to);
    let prefix = std::mem::replace(pending, rest);
    String::from_utf8(prefix).map_err(|e| TransportError::protocol(e.to_string()))
}

fn is_terminal(event: &SseEvent) -> bool {
    event.event == EVENT_RESULT || event.event == EVENT_ERROR
}

enum ResultData {
    Envelope(RpcResponse),
    Bare(Value),
}

/// `result` data is either a bare result or a full JSON-RPC response.
fn parse_result_data(data: &str) -> TransportResult<ResultData> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| TransportError::protocol(format!("malformed result event: {e}")))?;

    if value.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION) {
        let response = serde_json::from_value(value)
            .map_err(|e| TransportError::protocol(format!("malformed result envelope: {e}")))?;
        return Ok(ResultData::Envelope(response));
    }
    Ok(ResultData::Bare(value))
}

fn decode_call_event(event: SseEvent, tool: &str) -> TransportResult<Payload> {
    if event.event == EVENT_ERROR {
        return decode_error(&event.data, tool);
    }
    match parse_result_data(&event.data)? {
        ResultData::Envelope(response) => response.into_payload(tool),
        ResultData::Bare(value) => rpc::decode_tool_result(value, tool),
    }
}

fn decode_error<T>(data: &str, tool: &str) -> TransportResult<T> {
    let error: ErrorEvent = serde_json::from_str(data)
        .map_err(|e| TransportError::protocol(format!("malformed error event: {e}")))?;

    let message = match error.code {
        Some(code) => format!("{} (code {code})", error.message),
        None => error.message,
    };
    Err(TransportError::ToolFailed {
        tool: tool.to_string(),
        message,
    })
}

#[async_trait]
impl Transport for StreamingEventTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamingEvent
    }

    async fn invoke(
        &self,
        call: CallContext<'_>,
        cancel: &CancellationToken,
    ) -> TransportResult<Payload> {
        let endpoint = call.endpoint()?;
        let body = RpcRequest::tools_call(call.tool_name(), call.arguments.clone());

        debug!(
            call_id = %call.request.call_id(),
            uri = %endpoint.uri,
            rpc_id = body.id,
            "opening event stream"
        );

        let event = self
            .bounded(cancel, self.await_terminal(endpoint, &body))
            .await
            .inspect_err(|e| {
                if matches!(e, TransportError::Cancelled) {
                    debug!(call_id = %call.request.call_id(), "event stream cancelled");
                }
            })?;
        decode_call_event(event, call.tool_name())
    }

    async fn list_tools(
        &self,
        group: &ToolGroup,
        cancel: &CancellationToken,
    ) -> TransportResult<Vec<ToolSpec>> {
        let endpoint = remote_endpoint(group)?;
        debug!(uri = %endpoint.uri, "opening event stream for tools/list");

        self.bounded(
            cancel,
            rpc::collect_tool_pages(move |cursor| self.fetch_page(endpoint, cursor)),
        )
        .await
    }
}
