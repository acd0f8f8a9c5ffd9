//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docchat",
    version,
    about = "Chat with your documents over a session-scoped vector index",
    long_about = "Docchat splits plain-text documents into fingerprinted chunks, embeds them \
                  into a persistent per-session vector index, and answers questions against \
                  that index with MMR-ranked context plus conversation history."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/docchat/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest UTF-8 text files into a session index
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Session to add to (a new session is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Chunk size in characters
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Chunk overlap in characters
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Ask a single question against a session
    Ask {
        /// Question to ask
        question: String,

        /// Session to query
        #[arg(short, long)]
        session: String,

        /// Number of chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,

        /// Candidate pool size before MMR re-ranking
        #[arg(long)]
        fetch_k: Option<usize>,

        /// MMR relevance/diversity trade-off in [0, 1]
        #[arg(long)]
        lambda: Option<f32>,
    },

    /// Interactive chat against a session
    Chat {
        /// Session to query
        #[arg(short, long)]
        session: String,
    },

    /// List sessions with a persisted index
    Sessions,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
