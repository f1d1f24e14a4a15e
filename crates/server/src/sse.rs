use axum::response::sse::{Event, KeepAlive, Sse};
use broker_core::{FailureKind, ToolCallRequest, ToolCallResult};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;

/// Keep-alives double as disconnect checks: a client that went away is only
/// noticed on the next write, which is what cancels its in-flight call.
pub fn create_sse_stream<S>(events: S) -> Sse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("keep-alive-text"),
    )
}

pub fn create_call_started_event(request: &ToolCallRequest) -> Event {
    let data = json!({
        "call_id": request.call_id(),
        "tool_group_id": request.tool_group_id(),
        "tool_name": request.tool_name()
    });

    Event::default().event("call_started").data(data.to_string())
}

/// `result` for a success, `error_event` for a failure.
pub fn create_outcome_event(result: &ToolCallResult, duration_ms: u64) -> Event {
    match result {
        ToolCallResult::Success { payload } => {
            let data = json!({
                "payload": payload.to_value(),
                "duration_ms": duration_ms
            });
            Event::default().event("result").data(data.to_string())
        }
        ToolCallResult::Failure { kind, message } => {
            let data = json!({
                "kind": kind,
                "message": message,
                "retryable": is_retryable(*kind),
                "duration_ms": duration_ms
            });
            Event::default().event("error_event").data(data.to_string())
        }
    }
}

/// Hint for clients; the broker itself never retries.
pub fn is_retryable(kind: FailureKind) -> bool {
    matches!(kind, FailureKind::TransportError | FailureKind::Timeout)
}
