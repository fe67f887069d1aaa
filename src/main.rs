use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rekal_embed::config::Config;
use rekal_embed::embedder::nomic::{self, NomicEmbedder};
use rekal_embed::embedder::{Embedder, download};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rekal-embed", version, about = "Embed text with a local nomic GGUF model")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "")]
    config: String,

    /// GGUF model file (overrides the config)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Inference threads (overrides the config)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a document and print the vector as JSON
    Embed {
        text: String,
        /// Embed the text without the document task prefix
        #[arg(long)]
        raw: bool,
    },
    /// Embed a search query and print the vector as JSON
    Query { text: String },
    /// Print the embedding dimension of the loaded model
    Dim,
    /// Download the model file without loading it
    Download,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(model) = &cli.model {
        config.model_path = Some(model.to_string_lossy().into_owned());
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    config.validate().context("invalid configuration")?;

    if let Command::Download = cli.command {
        return download::download_model(&config.resolve_model_path());
    }

    anyhow::ensure!(
        nomic::supported(),
        "this build has no inference engine (enable the `llama` feature)"
    );
    let embedder = NomicEmbedder::from_config(&config)?;

    match cli.command {
        Command::Embed { text, raw } => {
            let vec = if raw {
                embedder.embed(&text)?
            } else {
                embedder.embed_document(&text)?
            };
            println!("{}", serde_json::to_string(&vec)?);
        }
        Command::Query { text } => {
            println!("{}", serde_json::to_string(&embedder.embed_query(&text)?)?);
        }
        Command::Dim => println!("{}", embedder.dimensions()),
        Command::Download => {}
    }

    Ok(())
}
