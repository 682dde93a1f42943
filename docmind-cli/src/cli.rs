use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use docmind_rag::{RerankerType, RetrievalMethod};

#[derive(Debug, Parser)]
#[command(name = "docmind", about = "Ask questions of a document folder and get cited answers")]
pub struct Cli {
    /// TOML settings file
    #[arg(long, global = true, env = "DOCMIND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a folder and answer a question with citations
    Ask(AskArgs),
    /// Ingest a folder and show the fused retrieval candidates
    Search(SearchArgs),
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Folder of .txt and .md files
    #[arg(long, short = 'd')]
    pub docs: PathBuf,

    /// The question
    pub query: String,

    /// Restrict to a document type (the file's top-level subfolder)
    #[arg(long = "type")]
    pub document_types: Vec<String>,

    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AskArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    #[arg(long, value_enum)]
    pub reranker: Option<RerankerArg>,

    /// Number of reranked chunks shown to the model
    #[arg(long, short = 'k')]
    pub max_results: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Maximum candidates to print
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Hybrid,
    Lexical,
    Dense,
}

impl From<MethodArg> for RetrievalMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Hybrid => RetrievalMethod::Hybrid,
            MethodArg::Lexical => RetrievalMethod::LexicalOnly,
            MethodArg::Dense => RetrievalMethod::DenseOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RerankerArg {
    CrossEncoder,
    Llm,
    Heuristic,
    None,
}

impl From<RerankerArg> for RerankerType {
    fn from(arg: RerankerArg) -> Self {
        match arg {
            RerankerArg::CrossEncoder => RerankerType::CrossEncoder,
            RerankerArg::Llm => RerankerType::Llm,
            RerankerArg::Heuristic => RerankerType::Heuristic,
            RerankerArg::None => RerankerType::None,
        }
    }
}
