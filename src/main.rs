mod config;
mod embeddings;
mod error;
mod llm;
mod loader;
mod logging;
mod prompts;
mod rag;
mod retriever;
mod shell;
mod splitter;
mod utils;
mod vector_db;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use config::AppConfig;
use embeddings::{Embedder, EmbeddingBackend};
use llm::{LanguageModel, OllamaClient};
use loader::DocumentLoader;
use rag::HealthRag;
use retriever::Retriever;
use shell::Shell;
use splitter::TextSplitter;
use vector_db::VectorIndex;

#[derive(Parser)]
#[command(name = "health-rag")]
#[command(about = "Ask health questions answered from your own documents")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the documents directory
    #[arg(long)]
    docs_dir: Option<PathBuf>,

    /// Override the vector index directory
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive question loop (default)
    Chat,
    /// Answer a single question and exit
    Ask {
        question: String,
        /// Number of documents to consult
        #[arg(short)]
        k: Option<usize>,
    },
    /// Show the documents a question would be answered from
    Sources {
        question: String,
        /// Number of documents to show
        #[arg(short)]
        k: Option<usize>,
    },
    /// Delete the persisted index and build it again
    Rebuild,
}

impl Commands {
    fn needs_model(&self) -> bool {
        matches!(self, Commands::Chat | Commands::Ask { .. })
    }
}

/// Loader -> splitter -> index -> retriever -> model.
async fn initialize(
    config: &AppConfig,
    check_model: bool,
) -> Result<HealthRag<EmbeddingBackend, OllamaClient>> {
    info!("1. Loading documents from {}", config.paths.docs_dir.display());
    let loader = DocumentLoader::new(&config.loader.extensions);
    debug!("Supported extensions: {}", loader.extensions().join(", "));
    let documents = loader.load_corpus(&config.paths.docs_dir)?;

    info!("2. Processing documents");
    let splitter = TextSplitter::new(config.splitter.chunk_size, config.splitter.chunk_overlap)?;
    debug!(
        "Chunk size {}, overlap {}",
        splitter.chunk_size(),
        splitter.chunk_overlap()
    );
    let chunks = splitter.split_documents(&documents);

    info!("3. Initializing RAG system");
    let timeout = Duration::from_secs(config.llm.timeout_secs);
    let embedder = EmbeddingBackend::from_config(&config.embedding, timeout)?;
    let index = VectorIndex::build_or_load(
        chunks,
        &config.paths.persist_path(),
        embedder,
        config.retrieval.metric,
    )
    .await?;
    info!(
        "Vector index ready: {} entries, {} dimensions, {:?} similarity, model {}",
        index.len(),
        index.dimension(),
        index.metric(),
        index.embedder().model_id()
    );
    if index.is_empty() {
        warn!("The vector index holds no entries; every question will get an empty context");
    }

    let retriever = Retriever::new(index, config.retrieval.k)
        .with_score_threshold(config.retrieval.score_threshold);

    let llm = OllamaClient::new(&config.llm)?;
    if check_model {
        llm.ping().await?;
        info!("Language model: {}", llm.model_name());
    }

    Ok(HealthRag::new(
        retriever,
        llm,
        config.prompt.template,
        config.llm.temperature,
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(dir) = cli.docs_dir {
        config.paths.docs_dir = dir;
    }
    if let Some(dir) = cli.index_dir {
        config.paths.index_dir = dir;
    }
    logging::init_logging(&config.logging, cli.verbose);

    let command = cli.command.unwrap_or(Commands::Chat);
    if let Commands::Ask { k: Some(k), .. } | Commands::Sources { k: Some(k), .. } = &command {
        ensure!(*k > 0, "-k must be at least 1");
    }

    if matches!(command, Commands::Rebuild) {
        vector_db::discard_persisted(&config.paths.persist_path())?;
    }

    let rag = initialize(&config, command.needs_model()).await?;

    match command {
        Commands::Chat => {
            let mut shell = Shell::new(&rag, rag.default_k());
            shell.run(io::stdin().lock(), io::stdout().lock()).await?;
            debug!("Session ended at {} documents per question", shell.k());
        }
        Commands::Ask { question, k } => {
            let answer = rag.ask(&question, k).await?;
            println!("{answer}");
        }
        Commands::Sources { question, k } => {
            let docs = rag.get_relevant_documents(&question, k).await?;
            println!("Relevant documents ({}):", docs.len());
            for (i, chunk) in docs.iter().enumerate() {
                println!("\n{}. {}", i + 1, chunk.metadata.source);
                println!("   Preview: {}", utils::preview(&chunk.text, 100));
            }
        }
        Commands::Rebuild => {
            println!(
                "Index rebuilt at {} with {} entries",
                config.paths.persist_path().display(),
                rag.retriever().index().len()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nError: {e:#}");
            eprintln!("\nMake sure that:");
            eprintln!("1. The documents folder holds PDF, TXT, MD, DOCX or EPUB files");
            eprintln!("2. Ollama is running and has the configured models pulled");
            ExitCode::FAILURE
        }
    }
}
