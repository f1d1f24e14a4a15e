use broker_core::{Config, ToolGroup, ToolGroupId};
use log::{info, warn};
use server::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set default log level if not already set
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("Starting tool-group broker");

    let config = match Config::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not load config ({}), using development defaults", e);
            create_development_config()?
        }
    }
    .with_env_overrides();

    let state = AppState::from_config(&config)?;
    info!(
        "Registered {} tool group(s); built-in providers: {:?}",
        state.broker.registry().len(),
        state.handlers.provider_ids()
    );

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_development_config() -> anyhow::Result<Config> {
    Ok(Config {
        toolgroups: vec![ToolGroup::builtin(ToolGroupId::parse("tools::math")?, "math")],
        ..Config::default()
    })
}
