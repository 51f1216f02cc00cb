//! HTTP gateway for llmcraft.
//!
//! A thin Axum facade over [`Orchestrator`]: query/JSON in, JSON or SSE
//! out. All pipeline semantics live in `llmcraft-agent`; this crate only
//! maps requests onto it and errors onto status codes.

pub mod ai;

use axum::{Router, extract::Query, extract::State, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use llmcraft_agent::{Orchestrator, RetrievalGate, ToolDispatcher};
use llmcraft_config::AppConfig;
use llmcraft_core::error::ProviderError;
use llmcraft_memory::{FlatVectorIndex, InMemorySessionStore};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Orchestrator,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn shared(orchestrator: Orchestrator) -> SharedState {
        Arc::new(Self { orchestrator })
    }
}

/// Wire up the pipeline from configuration.
///
/// With `with_retrieval`, the document corpus is indexed before returning.
/// An indexing failure is logged and the pipeline runs ungrounded.
pub async fn build_orchestrator(
    config: &AppConfig,
    with_retrieval: bool,
) -> Result<Orchestrator, ProviderError> {
    let provider = llmcraft_providers::build_from_config(config)?;
    let memory = Arc::new(InMemorySessionStore::new(config.memory.max_messages));
    let tools = ToolDispatcher::new(Arc::new(llmcraft_tools::default_registry()))
        .with_policy(config.agent.unknown_tool_policy);

    let mut orchestrator =
        Orchestrator::from_config(config, provider.clone(), memory).with_tools(tools);

    if with_retrieval {
        let index = Arc::new(FlatVectorIndex::new(
            provider,
            &config.model.embedding_model,
        ));
        let gate = Arc::new(RetrievalGate::from_config(index, &config.retrieval));
        if let Err(e) = gate.init(&config.retrieval.docs_path).await {
            warn!(error = %e, "Document indexing failed, answering without grounding");
        }
        orchestrator = orchestrator.with_retrieval(gate);
    }

    Ok(orchestrator)
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/hello", get(hello_handler))
        .route("/health", get(health_handler))
        .nest("/ai", ai::ai_router())
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let orchestrator = build_orchestrator(&config, true).await?;
    info!(
        provider = orchestrator.provider_name(),
        model = orchestrator.model(),
        grounded = orchestrator.retrieval_ready(),
        "Pipeline ready"
    );

    let app = build_router(GatewayState::shared(orchestrator));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// --- Handlers ---

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    status: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "llmcraft server is running!",
        status: "ok",
    })
}

#[derive(Deserialize)]
struct HelloQuery {
    #[serde(default = "default_name")]
    name: String,
}

fn default_name() -> String {
    "World".into()
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn hello_handler(Query(query): Query<HelloQuery>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("Hello, {}!", query.name),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
    model: String,
    backend: bool,
    retrieval: bool,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: orchestrator.provider_name().to_string(),
        model: orchestrator.model().to_string(),
        backend: orchestrator.backend_healthy().await,
        retrieval: orchestrator.retrieval_ready(),
    })
}
