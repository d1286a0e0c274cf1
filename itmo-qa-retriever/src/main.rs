use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use itmo_qa_embed::{CloudEmbedProvider, EmbeddingProvider};
use itmo_qa_retriever::{
    config::AppConfig,
    retrieval::{Ingestor, RetrievalOrchestrator},
    storage::{ArticleStore, DEFAULT_URL_PAGE_SIZE, SqliteArticleStore},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A CLI tool to manage and query the ITMO article store.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (environment variables override it)
    #[arg(short, long, env = "ITMO_QA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the article table if it does not exist
    Init,
    /// Embed and store articles from a JSON Lines file
    Ingest {
        /// File with one {"url", "text", "timestamp"?} object per line
        file: PathBuf,
        /// Specialization tag for records that do not carry their own
        #[arg(short, long)]
        specialization: String,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Print every stored URL
    Urls {
        /// URLs fetched per query
        #[arg(long, default_value_t = DEFAULT_URL_PAGE_SIZE)]
        page_size: usize,
    },
    /// Find the articles closest to a query text
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short, long)]
        k: Option<usize>,
        /// Restrict results to one specialization tag
        #[arg(short, long)]
        specialization: Option<String>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Build the per-specialization context for a question
    Context {
        question: String,
        /// Specialization tags (defaults to the configured list)
        #[arg(short, long = "specialization")]
        specializations: Vec<String>,
        /// Articles per specialization
        #[arg(short, long)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show article counts
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct StoreStats {
    table: String,
    embedding_dimension: usize,
    total_articles: u64,
    specializations: Vec<SpecializationCount>,
}

#[derive(Serialize)]
struct SpecializationCount {
    specialization: String,
    articles: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Builds the embedding provider the configuration selects.
async fn build_embedder(config: &AppConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = if let Some(cloud) = &config.cloud {
        Arc::new(CloudEmbedProvider::new(cloud.clone())?)
    } else if let Some(local) = &config.local {
        local_embedder(local).await?
    } else {
        bail!(
            "No embedding provider configured: set ITMO_QA_FOLDER_ID and ITMO_QA_API_KEY (or ITMO_QA_IAM_TOKEN)"
        );
    };

    if embedder.embedding_dimension() != config.store.embedding_dimension {
        bail!(
            "Embedding provider {} produces {} dimensions but the store expects {}",
            embedder.provider_name(),
            embedder.embedding_dimension(),
            config.store.embedding_dimension
        );
    }
    Ok(embedder)
}

#[cfg(feature = "local-models")]
async fn local_embedder(
    local: &itmo_qa_embed::LocalEmbedConfig,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(
        itmo_qa_embed::LocalEmbedProvider::create(local.clone()).await?,
    ))
}

#[cfg(not(feature = "local-models"))]
async fn local_embedder(
    _local: &itmo_qa_embed::LocalEmbedConfig,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    bail!("Local models are configured but this binary was built without the local-models feature")
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let store = Arc::new(SqliteArticleStore::open(&config.store).await?);
    let result = execute(args.command, &config, &store).await;
    store.close().await;
    result
}

async fn execute(
    command: Commands,
    config: &AppConfig,
    store: &Arc<SqliteArticleStore>,
) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            store.initialize_schema().await?;
            println!(
                "Initialized article table {} ({} dimensions) at {}",
                store.table_name(),
                store.dimension(),
                config.store.database_url
            );
            Ok(())
        }
        Commands::Ingest {
            file,
            specialization,
            format,
        } => {
            let input = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records = Ingestor::parse_jsonl(&input)
                .with_context(|| format!("Invalid JSON Lines in {}", file.display()))?;

            store.initialize_schema().await?;
            let embedder = build_embedder(config).await?;
            let ingestor = Ingestor::new(store.clone(), embedder);
            let report = ingestor.ingest(records, &specialization).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Summary | OutputFormat::Full => {
                    println!(
                        "Inserted: {} | Skipped: {} | Failed: {}",
                        report.inserted,
                        report.skipped,
                        report.failed.len()
                    );
                    for failure in &report.failed {
                        println!("  {} - {}", failure.url, failure.error);
                    }
                }
            }
            Ok(())
        }
        Commands::Urls { page_size } => {
            let mut urls = store.list_known_urls(page_size);
            while let Some(url) = urls.try_next().await? {
                println!("{url}");
            }
            Ok(())
        }
        Commands::Search {
            query,
            k,
            specialization,
            format,
        } => {
            let embedder = build_embedder(config).await?;
            let vector = embedder.encode_query(&query).await?;
            let k = k.unwrap_or(config.retrieval.k_per_specialization);
            let results = store
                .top_k_similar(&vector, k, specialization.as_deref())
                .await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} similar articles:", results.len());
                    for scored in results {
                        println!(
                            "  Distance: {:.4} | {} | {}",
                            scored.distance,
                            scored.article.specialization_source,
                            scored.article.url
                        );
                    }
                }
                OutputFormat::Full => {
                    for scored in results {
                        println!("Distance: {:.4}", scored.distance);
                        println!("URL: {}", scored.article.url);
                        println!("Specialization: {}", scored.article.specialization_source);
                        println!("Timestamp: {}", scored.article.timestamp);
                        println!("Content:\n{}", scored.article.article_text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
        Commands::Context {
            question,
            specializations,
            k,
            format,
        } => {
            let specializations = if specializations.is_empty() {
                config.retrieval.specializations.clone()
            } else {
                specializations
            };
            let k = k.unwrap_or(config.retrieval.k_per_specialization);

            let embedder = build_embedder(config).await?;
            let mut orchestrator = RetrievalOrchestrator::new(store.clone(), embedder);
            if let Some(timeout) = config.retrieval.timeout() {
                orchestrator = orchestrator.with_timeout(timeout);
            }
            let context = orchestrator
                .build_context(&question, specializations.as_slice(), k)
                .await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&context)?);
                }
                OutputFormat::Summary => {
                    for block in &context.blocks {
                        println!("[{}] {} articles", block.specialization, block.articles.len());
                        for scored in &block.articles {
                            println!("  Distance: {:.4} | {}", scored.distance, scored.article.url);
                        }
                    }
                }
                OutputFormat::Full => {
                    println!("{}", context.joined());
                }
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let stats = StoreStats {
                table: store.table_name().to_string(),
                embedding_dimension: store.dimension(),
                total_articles: store.article_count(None).await?,
                specializations: store
                    .specialization_counts()
                    .await?
                    .into_iter()
                    .map(|(specialization, articles)| SpecializationCount {
                        specialization,
                        articles,
                    })
                    .collect(),
            };

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Article Store Statistics:");
                    println!("  Table: {}", stats.table);
                    println!("  Embedding dimension: {}", stats.embedding_dimension);
                    println!("  Total articles: {}", stats.total_articles);
                    for entry in &stats.specializations {
                        println!("    {}: {}", entry.specialization, entry.articles);
                    }
                }
            }
            Ok(())
        }
    }
}
