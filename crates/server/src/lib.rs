pub mod errors;
pub mod models;
pub mod routes;
pub mod sse;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use broker::Broker;
use broker_core::Config;
use std::sync::Arc;
use tooling::{HandlerRegistry, ToolGroupRegistry};
use transport::TransportAdapter;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub handlers: Arc<HandlerRegistry>,
}

impl AppState {
    /// Wires built-in handlers, the three transports and every tool group
    /// listed in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let handlers = Arc::new(HandlerRegistry::with_builtins());
        let registry = Arc::new(ToolGroupRegistry::new());

        for group in &config.toolgroups {
            registry
                .register(group.clone())
                .with_context(|| format!("registering configured tool group {}", group.id))?;
        }

        let adapter = TransportAdapter::from_config(&config.transport, Arc::clone(&handlers));
        Ok(Self {
            broker: Arc::new(Broker::new(registry, adapter)),
            handlers,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/toolgroups",
            get(routes::list_toolgroups).post(routes::register_toolgroup),
        )
        .route(
            "/toolgroups/:id",
            get(routes::get_toolgroup).delete(routes::unregister_toolgroup),
        )
        .route("/toolgroups/:id/tools", get(routes::list_group_tools))
        .route("/providers", get(routes::list_providers))
        .route("/invoke", post(routes::invoke))
        .route("/invoke/stream", post(routes::invoke_stream))
        .with_state(state)
}
