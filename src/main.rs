use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, Level};

use knowledge_graph_builder::{
    datasource::source_for,
    query::{AnswerGenerator, ContextDocument},
    Config, EmbedderAdapter, EmbeddingEngine, ExtractorAdapter, GraphMerger, GraphStore,
    InMemoryGraphStore, InMemoryVectorIndex, IngestionOrchestrator, IngestionSettings, LLMEngine,
    LlmExtractor, QueryService, VectorDB, VectorIndex, VectorIndexer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Build and query a knowledge graph over a document corpus", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest documents from a JSON/markdown/text file, a directory or a URL
    Ingest { source: String },

    /// Documents most similar to a query
    Semantic {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Look up an entity by name
    Graph { name: String },

    /// Relationships around an entity
    Related {
        name: String,
        #[arg(short, long, default_value_t = 1)]
        depth: usize,
    },

    /// Shortest relationship chain between two entities
    Path { from: String, to: String },

    /// Assemble a RAG prompt, optionally answering it with the LLM
    Rag {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        generate: bool,
    },

    /// Clear the graph and the vector store
    Reset,

    /// Entity, relationship and embedding counts
    Stats,
}

#[derive(Serialize)]
struct RagOutput {
    context_documents: Vec<ContextDocument>,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
}

#[derive(Serialize)]
struct StatsOutput {
    entities: usize,
    relationships: usize,
    embeddings: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn embedder(config: &Config) -> Result<EmbedderAdapter> {
    let engine = EmbeddingEngine::new(config.embedding.clone())?;
    Ok(EmbedderAdapter::new(Arc::new(engine)))
}

async fn graph_store(config: &Config) -> Result<Arc<InMemoryGraphStore>> {
    let store = InMemoryGraphStore::load(&config.storage.graph_snapshot_path).await?;
    Ok(Arc::new(store))
}

/// Query service over both stores
async fn query_service(config: &Config) -> Result<QueryService> {
    let vectors: Arc<dyn VectorIndex> = Arc::new(VectorDB::new(config.vector_db.clone())?);
    Ok(QueryService::new(
        embedder(config)?,
        vectors,
        graph_store(config).await?,
    ))
}

/// Query service for graph-only commands; the vector side is never read
async fn graph_query_service(config: &Config) -> Result<QueryService> {
    Ok(QueryService::new(
        embedder(config)?,
        Arc::new(InMemoryVectorIndex::new()),
        graph_store(config).await?,
    ))
}

/// The snapshot is loaded and rewritten whole, so runs must not overlap
async fn ingest(config: &Config, source: &str) -> Result<()> {
    let documents = source_for(source)?
        .load()
        .await
        .with_context(|| format!("failed to load documents from {}", source))?;
    if documents.is_empty() {
        bail!("no documents found in {}", source);
    }

    let graph = graph_store(config).await?;
    let vectors: Arc<dyn VectorIndex> = Arc::new(VectorDB::new(config.vector_db.clone())?);
    let extractor = LlmExtractor::new(LLMEngine::new(config.llm.clone())?);

    let orchestrator = IngestionOrchestrator::new(
        ExtractorAdapter::new(Arc::new(extractor)),
        embedder(config)?,
        GraphMerger::new(graph.clone()),
        VectorIndexer::new(vectors),
        IngestionSettings::from(&config.processing),
    );

    let summary = orchestrator.ingest(documents).await;
    graph.save(&config.storage.graph_snapshot_path).await?;
    info!(path = %config.storage.graph_snapshot_path.display(), "graph snapshot written");

    print_json(&summary)?;
    if summary.is_total_failure() {
        bail!("all {} documents failed to ingest", summary.total);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;

    let level = Level::from_str(&config.processing.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let top_k = |requested: Option<usize>| requested.unwrap_or(config.query.default_top_k);

    match args.command {
        Command::Ingest { source } => ingest(&config, &source).await?,
        Command::Semantic { query, top_k: k } => {
            let service = query_service(&config).await?;
            print_json(&service.semantic_search(&query, top_k(k)).await?)?;
        }
        Command::Graph { name } => {
            let service = graph_query_service(&config).await?;
            print_json(&service.graph_search(&name).await?)?;
        }
        Command::Related { name, depth } => {
            let service = graph_query_service(&config).await?;
            print_json(&service.related_entities(&name, depth).await?)?;
        }
        Command::Path { from, to } => {
            let service = graph_query_service(&config).await?;
            print_json(&service.find_path(&from, &to).await?)?;
        }
        Command::Rag {
            query,
            top_k: k,
            generate,
        } => {
            let service = query_service(&config).await?;
            let rag = service.rag_context(&query, top_k(k)).await?;
            let answer = if generate {
                let llm = LLMEngine::new(config.llm.clone())?;
                Some(AnswerGenerator::generate(&llm, &rag.prompt).await?)
            } else {
                None
            };
            print_json(&RagOutput {
                context_documents: rag.context_documents,
                prompt: rag.prompt,
                answer,
            })?;
        }
        Command::Reset => {
            let graph = graph_store(&config).await?;
            graph.reset().await?;
            graph.save(&config.storage.graph_snapshot_path).await?;
            VectorDB::new(config.vector_db.clone())?.reset().await?;
            info!("corpus reset");
        }
        Command::Stats => {
            let graph = graph_store(&config).await?;
            let stats = graph.stats().await?;
            let embeddings = VectorDB::new(config.vector_db.clone())?.count().await?;
            print_json(&StatsOutput {
                entities: stats.entities,
                relationships: stats.relationships,
                embeddings,
            })?;
        }
    }

    Ok(())
}
