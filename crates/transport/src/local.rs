use crate::error::{TransportError, TransportResult};
use crate::{CallContext, Transport};
use async_trait::async_trait;
use broker_core::{Payload, ToolGroup, TransportKind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tooling::{HandlerRegistry, SharedHandler, ToolInput, ToolSpec};
use tracing::debug;

/// Serves groups without an endpoint from statically linked handlers.
pub struct LocalTransport {
    handlers: Arc<HandlerRegistry>,
}

impl LocalTransport {
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    fn handler(&self, provider_id: &str) -> TransportResult<SharedHandler> {
        self.handlers
            .get(provider_id)
            .ok_or_else(|| TransportError::ProviderNotFound {
                provider_id: provider_id.to_string(),
            })
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn invoke(
        &self,
        call: CallContext<'_>,
        cancel: &CancellationToken,
    ) -> TransportResult<Payload> {
        let provider_id = &call.group.provider_id;
        let handler = self.handler(provider_id)?;

        debug!(
            call_id = %call.request.call_id(),
            provider = %provider_id,
            tool = %call.tool_name(),
            "invoking built-in handler"
        );

        let input = ToolInput::new(call.tool_name()).with_arguments(call.arguments);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            outcome = handler.call(input) => outcome.map_err(|e| TransportError::ToolFailed {
                tool: e.tool_name,
                message: e.message,
            }),
        }
    }

    async fn list_tools(
        &self,
        group: &ToolGroup,
        _cancel: &CancellationToken,
    ) -> TransportResult<Vec<ToolSpec>> {
        Ok(self.handler(&group.provider_id)?.tools())
    }
}
