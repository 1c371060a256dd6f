use llm_gateway::config::GatewayConfig;
use llm_gateway::http::build_router;
use llm_gateway::state::AppState;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().expect("invalid configuration");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if config.openai_api_key.is_none() && config.anthropic_api_key.is_none() {
        tracing::warn!("no provider API keys configured; every chat request will 404 its provider");
    }

    let state = AppState::new(&config).expect("invalid orchestrator configuration");
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "llm-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
