mod auth;
mod catalog;
mod config;
mod cv;
mod db;
mod errors;
mod interview;
mod llm_client;
mod monitor;
mod rag;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use axum::http::HeaderValue;
use clap::{Parser, Subcommand};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::identity::FirebaseVerifier;
use crate::auth::jwt::JwtManager;
use crate::auth::rate_limit::RateLimiter;
use crate::catalog::majors::MajorCatalog;
use crate::catalog::universities::UniversityCatalog;
use crate::config::Config;
use crate::cv::evaluator::CvEvaluator;
use crate::db::{create_pool, init_schema};
use crate::interview::catalog::InterviewCatalog;
use crate::interview::service::InterviewService;
use crate::llm_client::{ChatModel, LlmClient};
use crate::monitor::HealthMonitor;
use crate::rag::agent::CareerAgent;
use crate::rag::chunking::Chunker;
use crate::rag::embeddings::EmbeddingGenerator;
use crate::rag::pdf::PdfProcessor;
use crate::rag::store::DocumentStore;
use crate::rag::{ingest, ChunkingStrategy};
use crate::routes::build_router;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "compass", version, about = "Career guidance API and RAG maintenance tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Extract every PDF under the data directory into raw documents
    Ingest {
        /// Directory to scan instead of DATA_DIR
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Re-chunk the raw documents and rebuild the embedding index
    BuildIndex {
        #[arg(long, value_enum, default_value = "parent")]
        strategy: ChunkingStrategy,
    },
    /// Print document store statistics
    DbStatus,
    /// Delete stored documents and/or chunks
    Clean {
        #[arg(long)]
        raw: bool,
        #[arg(long)]
        chunks: bool,
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = create_pool(&config.database_url).await?;
    init_schema(&db).await?;

    let llm = match config.llm.api_key.clone() {
        Some(key) => {
            let client = LlmClient::new(key, &config.llm)?;
            info!("LLM client initialized (model: {})", client.model_name());
            Some(Arc::new(client))
        }
        None => {
            warn!("LLM_API_KEY not set; LLM-backed features are disabled");
            None
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db, llm).await,
        Command::Ingest { dir } => {
            let root = dir.unwrap_or_else(|| config.data_dir.clone());
            let processor = PdfProcessor::new(chat_model(&llm), &config.rag);
            let report = ingest::ingest(&root, &processor, &DocumentStore::new(db)).await?;
            print_json(&report)
        }
        Command::BuildIndex { strategy } => {
            let Some(llm) = llm else {
                bail!("build-index needs LLM_API_KEY for embeddings");
            };
            let generator = EmbeddingGenerator::new(llm, config.llm.embedding_dimension);
            let chunker = Chunker::new(config.rag.chunk_size, config.rag.chunk_overlap);
            let report =
                ingest::build_index(&DocumentStore::new(db), &generator, &chunker, strategy).await?;
            print_json(&report)
        }
        Command::DbStatus => print_json(&DocumentStore::new(db).stats().await?),
        Command::Clean { raw, chunks, all } => {
            if !(raw || chunks || all) {
                bail!("nothing to clean: pass --raw, --chunks or --all");
            }
            let report = ingest::clean(&DocumentStore::new(db), raw || all, chunks || all).await?;
            print_json(&report)
        }
    }
}

async fn serve(config: Config, db: sqlx::SqlitePool, llm: Option<Arc<LlmClient>>) -> Result<()> {
    info!("Starting Compass API v{}", env!("CARGO_PKG_VERSION"));

    let http = reqwest::Client::new();
    let chat = chat_model(&llm);

    let interview_path = config.data_dir.join("interview").join("interview.json");
    let interview_catalog = InterviewCatalog::load(&interview_path).unwrap_or_else(|e| {
        warn!("Interview catalog unavailable: {e:#}");
        InterviewCatalog::default()
    });

    let universities = Arc::new(UniversityCatalog::new(config.data_dir.join("school")));
    universities.reload().await;

    let career_agent = match &llm {
        Some(llm) => {
            let generator = EmbeddingGenerator::new(llm.clone(), config.llm.embedding_dimension);
            let agent = CareerAgent::new(
                llm.clone(),
                generator,
                DocumentStore::new(db.clone()),
                config.rag.max_retrieval_results,
            )
            .await;
            Some(Arc::new(agent))
        }
        None => None,
    };

    let state = AppState {
        jwt: JwtManager::new(
            &config.jwt_secret,
            config.jwt_access_ttl_secs,
            config.jwt_refresh_ttl_secs,
        ),
        identity: Arc::new(FirebaseVerifier::new(config.firebase_project_id.clone(), http.clone())),
        rate_limiter: RateLimiter::from_config(&config).await?,
        cv: Arc::new(CvEvaluator::new(chat.clone())),
        interviews: Arc::new(InterviewService::new(interview_catalog, chat)),
        universities,
        majors: Arc::new(MajorCatalog::new(config.data_dir.join("job"))),
        career_agent,
        monitor: HealthMonitor::new(http, config.monitor_targets.clone()),
        db,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config)?);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn chat_model(llm: &Option<Arc<LlmClient>>) -> Option<Arc<dyn ChatModel>> {
    llm.clone().map(|client| client as Arc<dyn ChatModel>)
}

/// Permissive when no origins are configured.
fn cors_layer(config: &Config) -> Result<CorsLayer> {
    if config.allowed_origins.is_empty() {
        if !config.is_development() {
            warn!("ALLOWED_ORIGINS is empty; CORS is permissive");
        }
        return Ok(CorsLayer::permissive());
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
