//! # wikirag CLI
//!
//! ## Usage
//!
//! ```bash
//! wikirag --config ./config/wikirag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wikirag build` | Slice, embed and index the data directory into an archive |
//! | `wikirag query "<text>"` | Nearest documents, one per origin |
//! | `wikirag context "<text>"` | Grounding context assembled from the nearest slices |
//! | `wikirag inspect` | Show an archive's manifest and table sizes |
//!
//! The embedding API key is read from `embedding.api_key` or from the
//! environment variable named by `embedding.api_key_env`
//! (`EMBEDDING_API_KEY` by default). Logs go to stderr; set `RUST_LOG` to
//! change the level.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wikirag::archive::load_archive;
use wikirag::config::{load_config, Config};
use wikirag::context::assemble_context;
use wikirag::embedding::HttpEmbedder;
use wikirag::models::{Metadata, RetrievedDocument, ORIGIN_TITLE_KEY};
use wikirag::progress::{format_number, ProgressMode};
use wikirag::retrieval::{
    build, query, query_meta_only, query_meta_only_archive, BuildOptions, QueryOptions,
};

/// Characters of document content shown per result in text output.
const PREVIEW_CHARS: usize = 200;

/// Retrieval core for a wiki knowledge base.
#[derive(Parser)]
#[command(name = "wikirag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wikirag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the archive from the data directory.
    ///
    /// Replaces the archive only when every slice was embedded; on failure
    /// the previous archive is left as it was.
    Build {
        /// Directory of cleaned `*.json` documents.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Archive file to write.
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Maximum slice length in characters, before context padding.
        #[arg(long)]
        max_length: Option<usize>,

        /// Characters of neighboring text added on each side of a slice.
        #[arg(long)]
        context_length: Option<usize>,

        /// Embedding calls in flight at once.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Query the archive for the nearest documents.
    Query {
        text: String,

        /// Archive file to read.
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Nearest slices to consider before deduplication.
        #[arg(long)]
        top_k: Option<usize>,

        /// Return slice metadata instead of whole documents.
        #[arg(long)]
        meta_only: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Assemble grounding context for a question.
    Context {
        text: String,

        #[arg(long)]
        archive: Option<PathBuf>,

        #[arg(long)]
        top_k: Option<usize>,

        /// Cut the context to at most this many characters.
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Show an archive's manifest and table sizes.
    Inspect {
        #[arg(long)]
        archive: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikirag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            data_dir,
            archive,
            max_length,
            context_length,
            concurrency,
            progress,
        } => {
            let config = load_config(&cli.config)?;
            let mut opts = BuildOptions::from_config(&config);
            if let Some(dir) = data_dir {
                opts.data_dir = dir;
            }
            if let Some(path) = archive {
                opts.archive_path = path;
            }
            if let Some(n) = max_length {
                opts.max_length = n;
            }
            if let Some(n) = context_length {
                opts.context_length = n;
            }
            if let Some(n) = concurrency {
                opts.concurrency = n.max(1);
            }
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();

            let embedder = HttpEmbedder::from_config(&config.embedding)?;
            let report = build(&opts, &embedder, reporter.as_ref()).await?;
            println!(
                "Built {}: {} vectors from {} documents ({} dims)",
                report.archive_path.display(),
                format_number(report.vectors as u64),
                format_number(report.documents as u64),
                report.dims
            );
        }
        Commands::Query {
            text,
            archive,
            top_k,
            meta_only,
            json,
        } => {
            let config = load_config(&cli.config)?;
            let archive_path = archive.unwrap_or_else(|| config.archive.path.clone());
            let opts = query_options(&config, top_k);
            let embedder = HttpEmbedder::from_config(&config.embedding)?;

            if meta_only {
                let metas = query_meta_only(&archive_path, &text, &embedder, &opts).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&metas)?);
                } else {
                    print_metas(&metas);
                }
            } else {
                let docs = query(&archive_path, &text, &embedder, &opts).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&docs)?);
                } else {
                    print_documents(&docs);
                }
            }
        }
        Commands::Context {
            text,
            archive,
            top_k,
            max_chars,
        } => {
            let config = load_config(&cli.config)?;
            let archive_path = archive.unwrap_or_else(|| config.archive.path.clone());
            let opts = query_options(&config, top_k);
            let embedder = HttpEmbedder::from_config(&config.embedding)?;

            let loaded = load_archive(&archive_path)?;
            let metas = query_meta_only_archive(&loaded, &text, &embedder, &opts).await?;
            let max_chars = max_chars.unwrap_or(config.retrieval.max_context_chars);
            println!("{}", assemble_context(&loaded, &metas, max_chars));
        }
        Commands::Inspect { archive } => {
            let config = config_or_minimal(&cli.config)?;
            let archive_path = archive.unwrap_or_else(|| config.archive.path.clone());
            inspect(&archive_path)?;
        }
    }

    Ok(())
}

fn query_options(config: &Config, top_k: Option<usize>) -> QueryOptions {
    let mut opts = QueryOptions::from_config(config);
    if let Some(k) = top_k {
        opts.top_k = k;
    }
    opts
}

/// `inspect` runs without a config file; a file that exists must be valid.
fn config_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn inspect(path: &Path) -> Result<()> {
    let archive =
        load_archive(path).with_context(|| format!("Failed to inspect {}", path.display()))?;
    let m = &archive.manifest;

    println!("archive:   {}", path.display());
    println!("format:    v{}", m.format_version);
    println!("model:     {}", m.model);
    println!("dims:      {}", m.dims);
    println!("vectors:   {}", format_number(m.vectors as u64));
    println!("documents: {}", format_number(m.documents as u64));
    println!("raw:       {}", if m.has_raw { "yes" } else { "no" });
    println!("built:     {}", m.built_at.to_rfc3339());
    println!("sha256:    {}", m.index_sha256);
    println!("tables:");
    println!("  id2meta:    {}", format_number(archive.id2meta.len() as u64));
    println!("  id2content: {}", format_number(archive.id2content.len() as u64));
    println!("  id2title:   {}", format_number(archive.id2title.len() as u64));
    match &archive.id2raw {
        Some(raw) => println!("  id2raw:     {}", format_number(raw.len() as u64)),
        None => println!("  id2raw:     absent"),
    }
    Ok(())
}

fn print_documents(docs: &[RetrievedDocument]) {
    if docs.is_empty() {
        println!("No results.");
        return;
    }
    for (i, doc) in docs.iter().enumerate() {
        println!("{}. {}", i + 1, doc.title);
        if let Some(content) = &doc.content {
            let preview: String = content.chars().take(PREVIEW_CHARS).collect();
            let ellipsis = if content.chars().nth(PREVIEW_CHARS).is_some() {
                "..."
            } else {
                ""
            };
            println!("   {}{}", preview.replace('\n', " "), ellipsis);
        }
    }
}

fn print_metas(metas: &[Metadata]) {
    if metas.is_empty() {
        println!("No results.");
        return;
    }
    for (i, meta) in metas.iter().enumerate() {
        let title = meta.get(ORIGIN_TITLE_KEY).map(String::as_str).unwrap_or("");
        println!("{}. {}", i + 1, title);
        for (key, value) in meta {
            if key != ORIGIN_TITLE_KEY {
                println!("   {}: {}", key, value);
            }
        }
    }
}
