//! Parley application binary - composition root.
//!
//! Ties together all Parley crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the reference catalog, template store and language model
//! 3. Build the relational and document processors over shared caches
//! 4. Start the background cache sweep
//! 5. Run the chosen front end (HTTP API, terminal chat, or a one-shot report)

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use parley_api::state::AppState;
use parley_chat::llm::endpoint;
use parley_chat::{
    check_health, ConversationalRouter, DocumentProcessor, FieldMetadataCache,
    JsonTemplateStore, LanguageModel, OpenAiCompatibleModel, ProcessorRegistry,
    ReferenceCatalog, RelationalProcessor, SessionStore, TemplateStore,
};
use parley_core::config::{CacheConfig, ParleyConfig};
use parley_storage::{DocumentDriver, FileDocumentDriver, RelationalDriver, SqliteDriver};
use parley_vector::{DynEmbeddingService, HashEmbedding, HttpEmbedding, SemanticMemory};

use cli::{CliArgs, Command};

/// Vector width of OpenAI-compatible embedding models (`text-embedding-3-small`, ada-002).
const REMOTE_EMBEDDING_DIMENSIONS: usize = 1536;

const GREETING: &str = "Hi! Please enter your query.";

type BoxError = Box<dyn std::error::Error>;

/// Everything the front ends need, wired once.
struct Services {
    router: Arc<ConversationalRouter>,
    relational: Arc<dyn RelationalDriver>,
    document: Arc<dyn DocumentDriver>,
}

fn build_services(config: &ParleyConfig) -> Result<Services, BoxError> {
    let catalog = Arc::new(ReferenceCatalog::from_config(config));
    let templates: Arc<dyn TemplateStore> =
        Arc::new(JsonTemplateStore::new(&config.general.templates_dir));
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiCompatibleModel::from_config(&config.ai)?);
    tracing::info!(
        platform = ?config.ai.platform,
        model = %config.ai.model,
        "Language model configured"
    );

    let embedder: Arc<dyn DynEmbeddingService> = match &config.ai.embedding_model {
        Some(name) => {
            let (url, auth) = endpoint(&config.ai, "/embeddings", name)?;
            tracing::info!(model = %name, "Remote embeddings enabled");
            Arc::new(HttpEmbedding::new(
                url,
                auth,
                name.clone(),
                REMOTE_EMBEDDING_DIMENSIONS,
                Duration::from_secs(config.ai.timeout_secs),
            )?)
        }
        None => {
            tracing::info!("No embedding model configured, using local hashing embedder");
            Arc::new(HashEmbedding::new())
        }
    };
    let memory = Arc::new(SemanticMemory::with_retrieval_config(embedder, &config.retrieval));

    let relational: Arc<dyn RelationalDriver> = Arc::new(SqliteDriver::new());
    let document: Arc<dyn DocumentDriver> = Arc::new(FileDocumentDriver::new());

    let metadata = Arc::new(FieldMetadataCache::new(chrono::Duration::hours(i64::from(
        config.cache.field_metadata_ttl_hours,
    ))));
    let sessions = Arc::new(SessionStore::new(chrono::Duration::hours(i64::from(
        config.cache.session_ttl_hours,
    ))));

    let processors = ProcessorRegistry::new()
        .with(Arc::new(RelationalProcessor::new(
            Arc::clone(&relational),
            Arc::clone(&metadata),
            Arc::clone(&templates),
            Arc::clone(&model),
            config.ai.max_tokens,
        )))
        .with(Arc::new(
            DocumentProcessor::new(
                Arc::clone(&document),
                memory,
                Arc::clone(&templates),
                Arc::clone(&model),
                config.ai.max_tokens,
            )
            .with_retrieval(&config.retrieval),
        ));

    let router = ConversationalRouter::new(
        catalog,
        sessions,
        templates,
        model,
        processors,
        config.ai.max_tokens,
    )
    .with_metadata_cache(metadata);

    Ok(Services {
        router: Arc::new(router),
        relational,
        document,
    })
}

/// Purge expired sessions and field metadata on `[cache]`'s interval.
fn spawn_sweep(router: Arc<ConversationalRouter>, cache: &CacheConfig) {
    let Some(period) = cache.sweep_interval() else {
        tracing::info!("Background cache sweep disabled");
        return;
    };
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            router.purge_expired();
        }
    });
}

/// Read queries from stdin until `exit` or end of input.
async fn chat_loop(router: Arc<ConversationalRouter>, requestor: String) -> Result<(), BoxError> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(format!("{}\n> ", GREETING).as_bytes()).await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.eq_ignore_ascii_case("exit") {
            break;
        }
        if !query.is_empty() {
            let reply = router.converse(query, &requestor).await;
            stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let loaded = ParleyConfig::load(&config_file);
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    let services = build_services(&config)?;

    match args.command() {
        Command::Subjects => {
            for subject in services.router.get_subjects() {
                println!("{}", subject);
            }
        }
        Command::Health => {
            let report = check_health(
                services.router.catalog(),
                services.relational.as_ref(),
                services.document.as_ref(),
                services.router.model_name(),
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Chat { requestor } => {
            spawn_sweep(Arc::clone(&services.router), &config.cache);
            chat_loop(services.router, requestor).await?;
        }
        Command::Serve { .. } => {
            spawn_sweep(Arc::clone(&services.router), &config.cache);

            let port = args.resolve_port(config.server.port);
            let state = AppState::new(services.router, services.relational, services.document);
            if let Err(e) = parley_api::start_server(&config.server.host, port, state).await {
                tracing::error!(error = %e, "API server stopped");
                tracing::error!("Try: {}={} parley serve", cli::PORT_ENV, port.saturating_add(1));
                return Err(e.into());
            }
        }
    }

    Ok(())
}
