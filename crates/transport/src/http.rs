use crate::error::{TransportError, TransportResult};
use crate::rpc::{self, RpcRequest, RpcResponse, ToolPage};
use crate::{remote_endpoint, CallContext, Transport};
use async_trait::async_trait;
use broker_core::{Endpoint, Payload, ToolGroup, TransportKind};
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tooling::ToolSpec;
use tracing::{debug, warn};

/// Default maximum accepted response body size in bytes.
pub const RESPONSE_BODY_BYTES_MAX: usize = 5 * 1024 * 1024;

/// One POST per call, one JSON-RPC response back.
pub struct RequestResponseTransport {
    client: Client,
    timeout: Duration,
    body_limit: usize,
}

impl RequestResponseTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(Client::new(), timeout)
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            body_limit: RESPONSE_BODY_BYTES_MAX,
        }
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    async fn exchange<P: Serialize>(
        &self,
        endpoint: &Endpoint,
        body: &RpcRequest<P>,
    ) -> TransportResult<RpcResponse> {
        let url = reqwest::Url::parse(&endpoint.uri).map_err(|e| {
            TransportError::transport(format!("invalid endpoint uri '{}': {e}", endpoint.uri))
        })?;

        let mut request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        for (name, value) in &endpoint.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(uri = %endpoint.uri, %status, "tool endpoint returned non-success status");
            return Err(TransportError::transport(format!(
                "endpoint responded with HTTP {status}"
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.body_limit as u64 {
                return Err(self.oversized(length));
            }
        }

        // Content-Length may be absent or wrong, so the running total is
        // checked as well.
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify(e))?;
            if bytes.len() + chunk.len() > self.body_limit {
                return Err(self.oversized((bytes.len() + chunk.len()) as u64));
            }
            bytes.extend_from_slice(&chunk);
        }

        rpc::parse_response(&bytes)
    }

    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        cursor: Option<String>,
    ) -> TransportResult<ToolPage> {
        let body = RpcRequest::tools_list(cursor);
        self.exchange(endpoint, &body).await?.into_tool_page()
    }

    fn oversized(&self, length: u64) -> TransportError {
        TransportError::protocol(format!(
            "response body of at least {length} bytes exceeds {}",
            self.body_limit
        ))
    }

    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            TransportError::transport(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for RequestResponseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::RequestResponse
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
            "sending tools/call request"
        );

        let round_trip = async {
            self.exchange(endpoint, &body)
                .await
                .and_then(|response| response.into_payload(call.tool_name()))
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            outcome = round_trip => outcome,
        }
    }

    async fn list_tools(
        &self,
        group: &ToolGroup,
        cancel: &CancellationToken,
    ) -> TransportResult<Vec<ToolSpec>> {
        let endpoint = remote_endpoint(group)?;
        debug!(uri = %endpoint.uri, "sending tools/list request");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            outcome = rpc::collect_tool_pages(move |cursor| self.fetch_page(endpoint, cursor)) => outcome,
        }
    }
}
