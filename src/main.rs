use anyhow::bail;
use clap::{Parser, Subcommand};
use reg_rag::{
    answer::AnswerService,
    api::{create_router, AppState},
    audit::run_audit,
    completion::OpenAiCompletion,
    config::RagConfig,
    embedding::OpenAiEmbedding,
    retrieval::FanOutRetriever,
    vectorstore::PineconeStore,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "reg-rag", about = "Multi-namespace RAG answering service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Probe every configured namespace and exit non-zero on missing or
    /// empty namespaces.
    Audit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = RagConfig::from_env()?;

    let embedding = Arc::new(OpenAiEmbedding::new(&config.embedding)?);
    let store = Arc::new(PineconeStore::new(&config.vector_store)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let completion = Arc::new(OpenAiCompletion::new(&config.completion)?);
            let retriever = Arc::new(FanOutRetriever::new(
                embedding,
                store,
                config.vector_store.namespaces.clone(),
                config.retrieval.clone(),
            ));
            let answer = Arc::new(AnswerService::new(
                retriever,
                completion,
                config.retrieval.clone(),
            ));

            let state = AppState {
                answer,
                api_key: config.server.api_key.clone(),
            };
            let app = create_router(state, &config.server);

            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = TcpListener::bind(&addr).await?;

            info!(
                namespaces = config.vector_store.namespaces.len(),
                "reg-rag listening on {}", addr
            );

            axum::serve(listener, app).await?;
        }
        Command::Audit => {
            let report = run_audit(&config.vector_store.namespaces, embedding, store).await?;

            for ns in &report.namespaces {
                info!(
                    namespace = %ns.name,
                    vectors = ns.vector_count,
                    sources = ns.observed_sources.len(),
                    "audit result"
                );
            }

            if !report.is_healthy() {
                bail!(
                    "audit failed: missing namespaces {:?}, empty namespaces {:?}",
                    report.missing,
                    report
                        .namespaces
                        .iter()
                        .filter(|ns| ns.vector_count == 0)
                        .map(|ns| ns.name.as_str())
                        .collect::<Vec<_>>()
                );
            }

            info!("audit passed for all configured namespaces");
        }
    }

    Ok(())
}
