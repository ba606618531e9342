mod config;
mod download;
mod gemini;
mod github;
mod learn;
mod pr;
mod query;
mod report;
mod store;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use config::Config;
use download::Downloader;
use gemini::GeminiClient;
use github::{GitHubClient, RateLimiter};
use learn::LearningProcessor;
use query::AuthorSet;
use report::OutputFormat;
use store::RecordStore;

/// PR Learnings: download a repository's pull request discussions, distill
/// coding-style learnings from them with Gemini, and query comments by author.
#[derive(Parser, Debug)]
#[command(name = "pr-learnings", version, about)]
struct Cli {
    /// Config file (defaults to .pr-learnings.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding downloaded records and learnings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every pull request with its commits, comments and reviews
    Download {
        /// GitHub token (falls back to GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Repository owner
        #[arg(long)]
        owner: String,

        /// Repository name
        #[arg(long)]
        repo: String,
    },

    /// List comments and review bodies written by the given authors
    Query {
        /// Comma-separated GitHub logins
        #[arg(long)]
        authors: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Write the result to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Extract style learnings from every downloaded PR not yet processed
    ProcessPrs {
        /// Gemini API key (falls back to GEMINI_API_KEY)
        #[arg(long)]
        key: Option<String>,

        /// Gemini model (falls back to GEMINI_MODEL)
        #[arg(long)]
        model: Option<String>,
    },

    /// Merge all learnings into a single style guide
    Synthesize {
        /// Gemini API key (falls back to GEMINI_API_KEY)
        #[arg(long)]
        key: Option<String>,

        /// Gemini model (falls back to GEMINI_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// Style guide path (defaults to STYLE_GUIDE.md)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load(cli.config.as_deref())?;
    let store = RecordStore::new(config.data_dir(cli.data_dir.as_deref()));

    match cli.command {
        Command::Download { token, owner, repo } => {
            let token = config.github_token(token.as_deref())?;
            run_download(&config, &store, token, owner, repo).await?;
        }
        Command::Query { authors, output, out } => {
            run_query(&store, &authors, output, out.as_deref())?;
        }
        Command::ProcessPrs { key, model } => {
            let client = gemini_client(&config, key.as_deref(), model.as_deref())?;
            let processor =
                LearningProcessor::new(&client, &store, config.pacing.learning_delay());
            let summary = processor.process_all().await?;
            info!(
                processed = summary.processed.len(),
                skipped = summary.skipped,
                failed = summary.failed,
                "learning pass finished"
            );
        }
        Command::Synthesize { key, model, output } => {
            let client = gemini_client(&config, key.as_deref(), model.as_deref())?;
            let path = config.style_guide(output.as_deref());
            let summary = learn::synthesize(&client, &store, &path).await?;
            info!(
                prs = summary.prs,
                learnings = summary.learnings,
                topics = summary.topics.len(),
                path = %path.display(),
                "style guide written"
            );
        }
    }

    Ok(())
}

async fn run_download(
    config: &Config,
    store: &RecordStore,
    token: String,
    owner: String,
    repo: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let span = info_span!("download", owner = %owner, repo = %repo);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current request");
            on_signal.cancel();
        }
    });

    let limiter = RateLimiter::new(config.pacing.request_interval(), cancel);
    let client = GitHubClient::new(config.github_api_url(), &owner, &repo, token, limiter);
    let downloader = Downloader::new(
        &client,
        store,
        owner,
        repo,
        config.pacing.download_delay(),
    );

    let summary = downloader.download_all().instrument(span).await?;
    info!(
        total = summary.total,
        saved = summary.saved,
        failed = summary.failed,
        "download finished"
    );
    Ok(())
}

fn run_query(
    store: &RecordStore,
    authors: &str,
    format: OutputFormat,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let authors = AuthorSet::parse(authors);
    if authors.is_empty() {
        return Err("--authors must name at least one GitHub login".into());
    }

    let result = query::filter_by_authors(store, &authors)?;
    info!(rows = result.rows.len(), format = %format, "rendering query result");
    let rendered = report::render(
        format,
        &result.rows,
        &result.metadata,
        &authors,
        out.is_none(),
    )?;
    report::output(&rendered, out)?;
    Ok(())
}

fn gemini_client(
    config: &Config,
    key: Option<&str>,
    model: Option<&str>,
) -> Result<GeminiClient, config::ConfigError> {
    let api_key = config.gemini_api_key(key)?;
    Ok(GeminiClient::new(
        config.gemini_api_url(),
        api_key,
        config.gemini_model(model),
    ))
}
