//! Noesis server binary: wires the configuration, stores, LLM backend, and
//! HTTP router together and serves the research API.

use noesis::{
    AppState,
    llm::{LLMClient, Provider},
    research::backend::LlmResearchBackend,
    research::workflow::ResearchWorkflow,
    store::executions::DatabaseProvider,
    store::results::MemoryResultStore,
    types::{AppError, Result},
    utils::Config,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "swagger-ui")]
use utoipa::OpenApi;
#[cfg(feature = "swagger-ui")]
use utoipa_swagger_ui::SwaggerUi;

#[cfg(feature = "swagger-ui")]
#[derive(OpenApi)]
#[openapi(
    paths(
        noesis::api::handlers::health::health,
        noesis::api::handlers::research::start_research,
        noesis::api::handlers::research::get_research,
        noesis::api::handlers::research::get_research_threads,
        noesis::api::handlers::research::cancel_research,
    ),
    components(schemas(
        noesis::types::StartResearchRequest,
        noesis::types::StartResearchResponse,
        noesis::types::ResearchStatusResponse,
        noesis::types::ThreadStatusResponse,
    )),
    tags(
        (name = "research", description = "Research workflow endpoints"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// Build one client per workflow phase from the configured provider.
async fn build_backend(config: &Config) -> Result<Arc<LlmResearchBackend>> {
    let client_for = |model: &str| -> Result<Provider> {
        match config.llm.provider.as_str() {
            #[cfg(feature = "ollama")]
            "ollama" => Ok(Provider::Ollama {
                base_url: config.llm.ollama_url.clone(),
                model: model.to_string(),
            }),
            #[cfg(feature = "openai")]
            "openai" => {
                let api_key = config.llm.openai_api_key.clone().ok_or_else(|| {
                    AppError::InvalidInput(
                        "OPENAI_API_KEY is required for the openai provider".to_string(),
                    )
                })?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: config.llm.openai_api_base.clone(),
                    model: model.to_string(),
                })
            }
            other => Err(AppError::InvalidInput(format!(
                "Unknown or disabled LLM provider: '{}'",
                other
            ))),
        }
    };

    let planner: Arc<dyn LLMClient> =
        Arc::from(client_for(config.llm.planner_model())?.create_client().await?);
    let researcher: Arc<dyn LLMClient> = Arc::from(
        client_for(config.llm.research_model())?
            .create_client()
            .await?,
    );
    let synthesizer: Arc<dyn LLMClient> = Arc::from(
        client_for(config.llm.synthesis_model())?
            .create_client()
            .await?,
    );

    Ok(Arc::new(LlmResearchBackend::new(
        planner,
        researcher,
        synthesizer,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noesis_server=info,noesis=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let db_provider = DatabaseProvider::from_env();
    let executions = Arc::new(db_provider.create_store().await?);
    tracing::info!(provider = ?db_provider, "Execution store ready");

    let results: Arc<dyn noesis::store::results::ResultStore> = Arc::new(MemoryResultStore::new());

    let backend = build_backend(&config).await?;
    tracing::info!(
        provider = %config.llm.provider,
        planner = config.llm.planner_model(),
        research = config.llm.research_model(),
        synthesis = config.llm.synthesis_model(),
        "LLM backend ready"
    );

    let workflow = Arc::new(ResearchWorkflow::new(
        executions.clone(),
        results.clone(),
        backend,
        config.research.workflow_config(),
    ));

    let state = AppState {
        config: config.clone(),
        executions,
        results,
        workflow,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = axum::Router::new()
        .nest("/api", noesis::api::routes::create_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Could not bind {}: {}", addr, e)))?;
    tracing::info!(addr = %addr, "Noesis server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
