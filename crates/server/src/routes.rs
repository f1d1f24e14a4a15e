use crate::errors::ApiError;
use crate::models::{InvokeRequest, ProviderInfo};
use crate::sse::{create_call_started_event, create_outcome_event, create_sse_stream};
use crate::AppState;
use async_stream::stream;
use axum::{
    extract::{Json as ExtractJson, Path, State},
    http::StatusCode,
    response::{sse::Event, Json, Sse},
};
use broker_core::{ToolCallResult, ToolGroup, ToolGroupId};
use futures::stream::Stream;
use log::info;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tooling::ToolSpec;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn parse_id(raw: String) -> Result<ToolGroupId, ApiError> {
    ToolGroupId::parse(raw).map_err(|e| ApiError::ValidationError(e.to_string()))
}

pub async fn list_toolgroups(State(state): State<AppState>) -> Json<Vec<ToolGroup>> {
    Json(state.broker.registry().list().to_vec())
}

pub async fn get_toolgroup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ToolGroup>, ApiError> {
    let id = parse_id(id)?;
    Ok(Json(state.broker.registry().lookup(&id)?))
}

/// Takes a raw JSON body so an invalid identifier maps to 400 rather than
/// the extractor's 422.
pub async fn register_toolgroup(
    State(state): State<AppState>,
    ExtractJson(body): ExtractJson<Value>,
) -> Result<(StatusCode, Json<ToolGroup>), ApiError> {
    let group: ToolGroup =
        serde_json::from_value(body).map_err(|e| ApiError::ValidationError(e.to_string()))?;

    state.broker.registry().register(group.clone())?;
    info!("Registered tool group {} via API", group.id);
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn unregister_toolgroup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ToolGroup>, ApiError> {
    let id = parse_id(id)?;
    let removed = state.broker.registry().unregister(&id)?;
    info!("Unregistered tool group {} via API", removed.id);
    Ok(Json(removed))
}

/// Tools the group's provider offers right now. Remote groups are asked
/// over their own transport; the request is cancelled if the client leaves.
pub async fn list_group_tools(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ToolSpec>>, ApiError> {
    let id = parse_id(id)?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let tools = state.broker.list_tools(&id, &cancel).await?;
    Ok(Json(tools))
}

pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderInfo>> {
    let providers = state
        .handlers
        .provider_ids()
        .into_iter()
        .map(|provider_id| ProviderInfo {
            tools: state.handlers.schemas(&provider_id).unwrap_or_default(),
            provider_id,
        })
        .collect();
    Json(providers)
}

/// Tool failures come back as a 200 carrying a failure result; only a
/// malformed request is an HTTP error.
pub async fn invoke(
    State(state): State<AppState>,
    ExtractJson(body): ExtractJson<InvokeRequest>,
) -> Result<Json<ToolCallResult>, ApiError> {
    let request = body.into_call()?;
    Ok(Json(state.broker.call(request).await))
}

pub async fn invoke_stream(
    State(state): State<AppState>,
    ExtractJson(body): ExtractJson<InvokeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    let request = body.into_call()?;
    let broker = Arc::clone(&state.broker);

    // Dropping the response stream on client disconnect drops the guard,
    // which cancels the in-flight call.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let events = stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(create_call_started_event(&request));

        let started = Instant::now();
        let result = broker.call_with_cancel(request, cancel).await;
        yield Ok::<_, Infallible>(create_outcome_event(
            &result,
            started.elapsed().as_millis() as u64,
        ));
    };

    Ok(create_sse_stream(events))
}
