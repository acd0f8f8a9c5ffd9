use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use docchat::cli::{Cli, Commands};
use docchat::config::{Config, ConfigValidator};
use docchat::embedding;
use docchat::error::{DocChatError, Result};
use docchat::index::VectorIndexManager;
use docchat::ingest::Ingestor;
use docchat::llm;
use docchat::retrieval::{ConversationalRetriever, MmrParams};
use docchat::session::{generate_session_id, ChatTurn, MemorySessionStore, SessionStore};
use docchat::splitter::LoadedDocument;

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Ingest {
            files,
            session,
            chunk_size,
            chunk_overlap,
        } => {
            cmd_ingest(cli.config, files, session, chunk_size, chunk_overlap)?;
        }
        Commands::Ask {
            question,
            session,
            k,
            fetch_k,
            lambda,
        } => {
            cmd_ask(cli.config, &question, &session, k, fetch_k, lambda)?;
        }
        Commands::Chat { session } => {
            cmd_chat(cli.config, &session)?;
        }
        Commands::Sessions => {
            cmd_sessions(cli.config)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docchat=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn build_manager(config: &Config) -> Result<Arc<VectorIndexManager>> {
    let embedder = embedding::provider_from_config(&config.embedding)?;
    Ok(Arc::new(VectorIndexManager::new(
        config.storage.index_root(),
        embedder,
        config.index.hnsw_params(),
    )))
}

fn cmd_ingest(
    config_path: Option<PathBuf>,
    files: Vec<PathBuf>,
    session: Option<String>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(size) = chunk_size {
        config.splitter.chunk_size = size;
    }
    if let Some(overlap) = chunk_overlap {
        config.splitter.chunk_overlap = overlap;
    }
    ConfigValidator::validate(&config)?;

    let mut docs = Vec::with_capacity(files.len());
    for path in &files {
        let text = std::fs::read_to_string(path).map_err(|e| DocChatError::Io {
            source: e,
            context: format!("Failed to read document: {}", path.display()),
        })?;
        docs.push(LoadedDocument::new(text, path.display().to_string()));
    }

    let manager = build_manager(&config)?;
    let session_id = session.unwrap_or_else(generate_session_id);
    let ingestor = Ingestor::new(
        manager,
        config.splitter.chunk_size,
        config.splitter.chunk_overlap,
    );

    let report = ingestor.ingest(&session_id, &docs)?;
    println!("session: {}", report.session_id);
    println!(
        "indexed {} of {} chunks ({} duplicates skipped)",
        report.added,
        report.chunks,
        report.chunks - report.added
    );
    Ok(())
}

fn load_retriever(
    config: &Config,
    session: &str,
    params: MmrParams,
) -> Result<ConversationalRetriever> {
    let manager = build_manager(config)?;
    let llm = llm::provider_from_config(&config.llm)?;
    let mut retriever =
        ConversationalRetriever::new(manager, llm, config.retrieval.context_limits());
    retriever.load_retriever(session, params)?;
    Ok(retriever)
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    session: &str,
    k: Option<usize>,
    fetch_k: Option<usize>,
    lambda: Option<f32>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(k) = k {
        config.retrieval.k = k;
    }
    if let Some(fetch_k) = fetch_k {
        config.retrieval.fetch_k = fetch_k;
    }
    if let Some(lambda) = lambda {
        config.retrieval.lambda_mult = lambda;
    }
    ConfigValidator::validate(&config)?;

    let retriever = load_retriever(&config, session, config.retrieval.mmr_params())?;
    let answer = retriever.invoke(question, &[])?;
    println!("{}", answer);
    Ok(())
}

fn cmd_chat(config_path: Option<PathBuf>, session: &str) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    ConfigValidator::validate(&config)?;

    let retriever = load_retriever(&config, session, config.retrieval.mmr_params())?;
    let store = MemorySessionStore::new();

    println!("chatting against {} (exit with 'quit' or Ctrl-D)", session);
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush().map_err(|e| DocChatError::Io {
            source: e,
            context: "Failed to flush stdout".to_string(),
        })?;

        let mut line = String::new();
        let read = stdin.read_line(&mut line).map_err(|e| DocChatError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })?;
        if read == 0 {
            break;
        }

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "quit" | "exit") {
            break;
        }

        let history = store.history(session);
        match retriever.invoke(message, &history) {
            Ok(answer) => {
                println!("{}", answer);
                store.append(
                    session,
                    ChatTurn {
                        user: message.to_string(),
                        assistant: answer,
                    },
                );
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    Ok(())
}

fn cmd_sessions(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;

    let sessions = docchat::index::list_sessions(&config.storage.index_root())?;
    if sessions.is_empty() {
        println!("no sessions found under {}", config.storage.index_root().display());
        return Ok(());
    }
    for session in sessions {
        println!("{}", session);
    }
    Ok(())
}
