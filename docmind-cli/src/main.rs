use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docmind_rag::{
    AnswerResult, AnswerStatus, Document, ExtractiveLlm, FilterSet, FusedCandidate,
    HashEmbeddingProvider, PipelineConfig, RagPipeline, RagPipelineBuilder, RecursiveChunker,
    keys,
};
use tracing::{info, warn};

mod cli;
mod settings;

use cli::{AskArgs, Cli, Command, QueryArgs, SearchArgs};
use settings::{ProviderKind, ProviderSettings, Settings};

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

fn init_logging(verbose: u8, json: bool) -> anyhow::Result<()> {
    let result = if json {
        docmind_telemetry::init_json_telemetry("docmind-cli")
    } else {
        let filter = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        docmind_telemetry::init_with_filter("docmind-cli", filter)
    };
    result.map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs)?;

    let settings = Settings::load(cli.config.as_deref())?;
    match cli.command {
        Command::Ask(args) => ask(&settings, args).await,
        Command::Search(args) => search(&settings, args).await,
    }
}

async fn ask(settings: &Settings, args: AskArgs) -> anyhow::Result<()> {
    let pipeline = build_pipeline(settings)?;
    ingest_folder(&pipeline, &args.query.docs).await?;

    let mut config = query_config(settings, &args.query);
    if let Some(reranker) = args.reranker {
        config.reranker_type = reranker.into();
    }
    if let Some(max_results) = args.max_results {
        config.max_results = max_results;
    }
    let filters = query_filters(&args.query);

    let result = match pipeline.answer_query(&args.query.query, &filters, &config).await {
        Ok(result) => result,
        Err(e) => {
            let failure = docmind_rag::QueryFailure::from(&e);
            if args.query.json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            return Err(e.into());
        }
    };

    if result.retrieval_stats.partial_retrieval {
        warn!(failed_sources = ?result.retrieval_stats.failed_sources, "answered from partial retrieval");
    }
    if args.query.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_answer(&result);
    }
    Ok(())
}

async fn search(settings: &Settings, args: SearchArgs) -> anyhow::Result<()> {
    let pipeline = build_pipeline(settings)?;
    ingest_folder(&pipeline, &args.query.docs).await?;

    let config = query_config(settings, &args.query);
    let filters = query_filters(&args.query);
    let fused = pipeline.search(&args.query.query, &filters, &config).await?;
    let shown = &fused[..fused.len().min(args.limit)];

    if args.query.json {
        let rows: Vec<serde_json::Value> = shown
            .iter()
            .map(|c| {
                serde_json::json!({
                    "chunk_id": c.chunk_id(),
                    "document_id": c.chunk.document_id,
                    "fused_score": c.fused_score,
                    "sources": c.sources,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (i, candidate) in shown.iter().enumerate() {
            print_candidate(i + 1, candidate);
        }
    }
    Ok(())
}

fn build_pipeline(settings: &Settings) -> anyhow::Result<RagPipeline> {
    let chunker = RecursiveChunker::new(settings.chunking.chunk_size, settings.chunking.chunk_overlap)?;
    let builder = RagPipeline::builder()
        .config(settings.pipeline.clone())
        .limits(settings.limits.clone())
        .chunker(Arc::new(chunker));
    let builder = with_lexical_backend(builder)?;

    let builder = match settings.provider.kind {
        ProviderKind::Extractive => builder
            .embedding_provider(Arc::new(HashEmbeddingProvider::new(settings.provider.embedding_dimensions)?))
            .llm(Arc::new(ExtractiveLlm::new())),
        ProviderKind::Openai => with_openai(builder, &settings.provider)?,
    };
    Ok(builder.build()?)
}

#[cfg(feature = "tantivy")]
fn with_lexical_backend(builder: RagPipelineBuilder) -> anyhow::Result<RagPipelineBuilder> {
    Ok(builder.lexical_index(Arc::new(docmind_rag::TantivyLexicalIndex::in_ram()?)))
}

#[cfg(not(feature = "tantivy"))]
fn with_lexical_backend(builder: RagPipelineBuilder) -> anyhow::Result<RagPipelineBuilder> {
    Ok(builder)
}

#[cfg(feature = "openai")]
fn with_openai(builder: RagPipelineBuilder, provider: &ProviderSettings) -> anyhow::Result<RagPipelineBuilder> {
    use docmind_model::{OpenAiCompatibleClient, OpenAiConfig};
    use docmind_rag::OpenAIEmbeddingProvider;

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set for the openai provider")?;
    let mut client_config = OpenAiConfig::new(api_key.clone());
    let mut embedder = OpenAIEmbeddingProvider::new(api_key)?;
    if let Some(base_url) = &provider.base_url {
        client_config = client_config.with_base_url(base_url.clone());
        embedder = embedder.with_base_url(base_url.clone());
    }
    if let Some(model) = &provider.model {
        client_config = client_config.with_model(model.clone());
    }
    let llm = OpenAiCompatibleClient::new(client_config)?;
    Ok(builder.embedding_provider(Arc::new(embedder)).llm(Arc::new(llm)))
}

#[cfg(not(feature = "openai"))]
fn with_openai(_builder: RagPipelineBuilder, _provider: &ProviderSettings) -> anyhow::Result<RagPipelineBuilder> {
    anyhow::bail!("the openai provider requires building docmind-cli with the `openai` feature")
}

fn query_config(settings: &Settings, args: &QueryArgs) -> PipelineConfig {
    let mut config = settings.pipeline.clone();
    if let Some(method) = args.method {
        config.retrieval_method = method.into();
    }
    config
}

fn query_filters(args: &QueryArgs) -> FilterSet {
    args.document_types
        .iter()
        .fold(FilterSet::new(), |filters, kind| filters.with_document_type(kind.clone()))
}

async fn ingest_folder(pipeline: &RagPipeline, root: &Path) -> anyhow::Result<()> {
    let documents = load_documents(root)?;
    if documents.is_empty() {
        warn!(root = %root.display(), "no .txt or .md files found");
    }
    let chunks = pipeline.ingest_batch(&documents).await?;
    info!(documents = documents.len(), chunks = chunks.len(), "ingested folder");
    Ok(())
}

fn load_documents(root: &Path) -> anyhow::Result<Vec<Document>> {
    let mut paths = Vec::new();
    collect_files(root, &mut paths)?;
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let mut document = Document::new(document_id(relative), text).with_source_uri(path.display().to_string());
        if let Some(kind) = document_type(relative) {
            document = document.with_metadata(keys::DOCUMENT_TYPE, kind);
        }
        documents.push(document);
    }
    Ok(documents)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Relative path without extension, `/`-separated, whitespace replaced.
fn document_id(relative: &Path) -> String {
    relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().replace(char::is_whitespace, "-"))
        .collect::<Vec<_>>()
        .join("/")
}

/// The top-level subfolder a file sits in, if any.
fn document_type(relative: &Path) -> Option<String> {
    let parent = relative.parent()?;
    parent.components().next().map(|c| c.as_os_str().to_string_lossy().into_owned())
}

fn print_answer(result: &AnswerResult) {
    println!("{}\n", result.answer_text);
    let status = match result.status {
        AnswerStatus::Grounded => "grounded",
        AnswerStatus::Unverified => "unverified",
        AnswerStatus::CannotAnswer => "cannot answer",
    };
    println!("status: {status}  confidence: {:.2}  model: {}", result.confidence_score, result.model_used);
    for (i, citation) in result.citations.iter().enumerate() {
        println!("[{}] {} ({}): \"{}\"", i + 1, citation.chunk_id, citation.document_id, citation.span.text.trim());
    }
    let stats = &result.retrieval_stats;
    if stats.reranker_skipped {
        println!("note: reranker skipped, fusion order used");
    }
    if stats.claims_flagged > 0 {
        println!("note: {} claim(s) had no supporting citation", stats.claims_flagged);
    }
    if stats.unsupported_sentences > 0 {
        println!("note: {} sentence(s) of the answer are not backed by a citation", stats.unsupported_sentences);
    }
}

fn print_candidate(rank: usize, candidate: &FusedCandidate) {
    let sources: Vec<String> = candidate.sources.iter().map(ToString::to_string).collect();
    let preview: String = candidate.chunk.text.chars().take(80).collect();
    println!(
        "{rank:>3}. {:.4}  {:<24} [{}]  {}",
        candidate.fused_score,
        candidate.chunk_id(),
        sources.join("+"),
        preview.replace('\n', " ")
    );
}
