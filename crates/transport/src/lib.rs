//! Transport Adapter: turns a resolved tool group plus a call request into a
//! normalized [`ToolCallResult`], whatever wire the provider speaks.
//!
//! Each [`TransportKind`] is served by one [`Transport`] implementation.
//! Adding a transport means adding a kind and an impl; callers only ever see
//! [`TransportAdapter::dispatch`].

pub mod error;
pub mod http;
pub mod local;
pub mod rpc;
pub mod sse;
pub mod streaming;

use async_trait::async_trait;
use broker_core::{
    Arguments, Endpoint, Payload, ToolCallRequest, ToolCallResult, ToolGroup, TransportConfig,
    TransportKind,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tooling::{HandlerRegistry, ToolSpec};
use tracing::debug;

pub use error::{TransportError, TransportResult};
pub use http::RequestResponseTransport;
pub use local::LocalTransport;
pub use streaming::{ConnectionGauge, StreamingEventTransport};

/// Everything a transport needs for one call. `arguments` already has the
/// group's static args merged in.
#[derive(Debug, Clone)]
pub struct CallContext<'a> {
    pub group: &'a ToolGroup,
    pub request: &'a ToolCallRequest,
    pub arguments: Arguments,
}

impl<'a> CallContext<'a> {
    pub fn new(group: &'a ToolGroup, request: &'a ToolCallRequest) -> Self {
        Self {
            group,
            request,
            arguments: merge_arguments(group.static_args.as_ref(), request.arguments()),
        }
    }

    pub fn tool_name(&self) -> &'a str {
        self.request.tool_name()
    }

    pub fn endpoint(&self) -> TransportResult<&'a Endpoint> {
        remote_endpoint(self.group)
    }
}

pub fn remote_endpoint(group: &ToolGroup) -> TransportResult<&Endpoint> {
    group.endpoint.as_ref().ok_or_else(|| {
        TransportError::transport(format!("tool group '{}' has no endpoint", group.id))
    })
}

/// Static args act as defaults; request arguments win on collision.
pub fn merge_arguments(static_args: Option<&Arguments>, arguments: &Arguments) -> Arguments {
    let mut merged = static_args.cloned().unwrap_or_default();
    for (key, value) in arguments {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Performs the call. Implementations must release any connection they
    /// open on every exit path, including cancellation.
    async fn invoke(
        &self,
        call: CallContext<'_>,
        cancel: &CancellationToken,
    ) -> TransportResult<Payload>;

    /// Tools the group's provider currently offers.
    async fn list_tools(
        &self,
        group: &ToolGroup,
        cancel: &CancellationToken,
    ) -> TransportResult<Vec<ToolSpec>>;
}

pub struct TransportAdapter {
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
}

impl TransportAdapter {
    pub fn new() -> Self {
        Self {
            transports: HashMap::new(),
        }
    }

    /// Adapter wired with the three standard transports.
    pub fn from_config(config: &TransportConfig, handlers: Arc<HandlerRegistry>) -> Self {
        Self::new()
            .with_transport(Arc::new(LocalTransport::new(handlers)))
            .with_transport(Arc::new(StreamingEventTransport::new(
                config.stream_timeout(),
            )))
            .with_transport(Arc::new(RequestResponseTransport::new(
                config.request_timeout(),
            )))
    }

    /// Installs `transport` for its kind, replacing any previous one.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport.kind(), transport);
        self
    }

    pub fn supports(&self, kind: TransportKind) -> bool {
        self.transports.contains_key(&kind)
    }

    pub async fn dispatch(
        &self,
        group: &ToolGroup,
        request: &ToolCallRequest,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let kind = group.transport_kind();
        let Some(transport) = self.transports.get(&kind) else {
            return TransportError::transport(format!("no transport installed for '{kind}'"))
                .into();
        };

        debug!(
            call_id = %request.call_id(),
            tool_group = %group.id,
            transport = %kind,
            "dispatching call"
        );

        match transport.invoke(CallContext::new(group, request), cancel).await {
            Ok(payload) => ToolCallResult::success(payload),
            Err(error) => error.into(),
        }
    }

    pub async fn list_tools(
        &self,
        group: &ToolGroup,
        cancel: &CancellationToken,
    ) -> TransportResult<Vec<ToolSpec>> {
        let kind = group.transport_kind();
        let transport = self.transports.get(&kind).ok_or_else(|| {
            TransportError::transport(format!("no transport installed for '{kind}'"))
        })?;

        debug!(tool_group = %group.id, transport = %kind, "listing tools");
        transport.list_tools(group, cancel).await
    }
}

impl Default for TransportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.transports.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("TransportAdapter")
            .field("transports", &kinds)
            .finish()
    }
}
