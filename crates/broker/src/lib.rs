//! Invocation Broker: resolves a tool call against an injected registry and
//! dispatches it through the transport adapter.
//!
//! The broker holds no per-call state between calls and never retries; a
//! caller that wants retries layers them above [`Broker::call`] with its own
//! knowledge of tool idempotence.

use broker_core::{FailureKind, ToolCallRequest, ToolCallResult, ToolGroupId};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tooling::{ToolGroupRegistry, ToolSpec};
use tracing::{debug, info, warn};
use transport::{TransportAdapter, TransportError};

/// Why a tool group's tools could not be listed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("tool group '{0}' is not registered")]
    UnknownToolGroup(ToolGroupId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DiscoveryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DiscoveryError::UnknownToolGroup(_) => FailureKind::UnknownToolGroup,
            DiscoveryError::Transport(error) => error.kind(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    Resolving,
    Dispatching,
    Succeeded,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Succeeded | CallState::Failed)
    }

    fn permits(self, next: CallState) -> bool {
        matches!(
            (self, next),
            (CallState::Received, CallState::Resolving)
                | (CallState::Resolving, CallState::Dispatching)
                | (CallState::Resolving, CallState::Failed)
                | (CallState::Dispatching, CallState::Succeeded)
                | (CallState::Dispatching, CallState::Failed)
        )
    }
}

/// Result of one call together with the states it moved through.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub result: ToolCallResult,
    pub states: Vec<CallState>,
}

struct CallTracker {
    states: Vec<CallState>,
}

impl CallTracker {
    fn new() -> Self {
        Self {
            states: vec![CallState::Received],
        }
    }

    fn current(&self) -> CallState {
        self.states
            .last()
            .copied()
            .unwrap_or(CallState::Received)
    }

    fn advance(&mut self, request: &ToolCallRequest, next: CallState) {
        let current = self.current();
        debug_assert!(current.permits(next), "illegal transition {current:?} -> {next:?}");
        debug!(call_id = %request.call_id(), from = ?current, to = ?next, "call state");
        self.states.push(next);
    }

    fn finish(mut self, request: &ToolCallRequest, result: ToolCallResult) -> CallOutcome {
        let terminal = if result.is_success() {
            CallState::Succeeded
        } else {
            CallState::Failed
        };
        self.advance(request, terminal);
        CallOutcome {
            result,
            states: self.states,
        }
    }
}

pub struct Broker {
    registry: Arc<ToolGroupRegistry>,
    adapter: TransportAdapter,
}

impl Broker {
    pub fn new(registry: Arc<ToolGroupRegistry>, adapter: TransportAdapter) -> Self {
        Self { registry, adapter }
    }

    pub fn registry(&self) -> &Arc<ToolGroupRegistry> {
        &self.registry
    }

    pub async fn call(&self, request: ToolCallRequest) -> ToolCallResult {
        self.call_with_cancel(request, CancellationToken::new()).await
    }

    /// Like [`Broker::call`], aborting promptly once `cancel` fires.
    /// Cancelling after the call has returned has no effect.
    pub async fn call_with_cancel(
        &self,
        request: ToolCallRequest,
        cancel: CancellationToken,
    ) -> ToolCallResult {
        self.call_traced(&request, &cancel).await.result
    }

    pub async fn call_traced(
        &self,
        request: &ToolCallRequest,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let started = Instant::now();
        let mut tracker = CallTracker::new();

        tracker.advance(request, CallState::Resolving);
        let group = match self.registry.get(request.tool_group_id()) {
            Some(group) => group,
            None => {
                warn!(
                    call_id = %request.call_id(),
                    tool_group = %request.tool_group_id(),
                    "call to unknown tool group"
                );
                let result = ToolCallResult::failure(
                    FailureKind::UnknownToolGroup,
                    format!("tool group '{}' is not registered", request.tool_group_id()),
                );
                return tracker.finish(request, result);
            }
        };

        tracker.advance(request, CallState::Dispatching);
        let result = self.adapter.dispatch(&group, request, cancel).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match result.failure_kind() {
            None => info!(
                call_id = %request.call_id(),
                tool_group = %group.id,
                tool = %request.tool_name(),
                duration_ms,
                "tool call succeeded"
            ),
            Some(kind) => warn!(
                call_id = %request.call_id(),
                tool_group = %group.id,
                tool = %request.tool_name(),
                duration_ms,
                %kind,
                "tool call failed"
            ),
        }

        tracker.finish(request, result)
    }

    /// Asks the group's provider which tools it offers. Built-in groups
    /// answer from their handler; remote groups are sent `tools/list`.
    pub async fn list_tools(
        &self,
        id: &ToolGroupId,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolSpec>, DiscoveryError> {
        let group = self
            .registry
            .get(id)
            .ok_or_else(|| DiscoveryError::UnknownToolGroup(id.clone()))?;

        match self.adapter.list_tools(&group, cancel).await {
            Ok(tools) => {
                debug!(tool_group = %id, tools = tools.len(), "listed tools");
                Ok(tools)
            }
            Err(error) => {
                warn!(tool_group = %id, kind = %error.kind(), "tool listing failed: {error}");
                Err(error.into())
            }
        }
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("tool_groups", &self.registry.len())
            .field("adapter", &self.adapter)
            .finish()
    }
}
