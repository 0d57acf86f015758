//! simplex CLI: simplicial agent memory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use simplicial_memory::collab::{DelimitedExtractor, HashingEmbedder};
use simplicial_memory::config::MemoryConfig;
use simplicial_memory::engine::Engine;
use simplicial_memory::ids::UserId;
use simplicial_memory::witness::{Observation, TextObservation};

#[derive(Parser)]
#[command(name = "simplex", version, about = "Simplicial-complex agent memory")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent storage (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Owning user of every record read or written.
    #[arg(long, global = true, default_value = "1")]
    user: u64,

    /// Dimension of the built-in hashing embedder (defaults to the configured
    /// embedding dimension, else 256).
    #[arg(long, global = true)]
    dimension: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a data directory.
    Init,

    /// Ingest timestamped observations from a JSON file.
    Ingest {
        /// JSON array of {timestamp, location?, entities, relationships?}.
        #[arg(long)]
        file: PathBuf,
    },

    /// Ingest timestamped raw text, one entity per comma-separated phrase.
    ///
    /// Extraction progress is checkpointed in the data directory; an
    /// interrupted run continues where it stopped.
    IngestText {
        /// JSON array of {timestamp, location?, text}.
        #[arg(long)]
        file: PathBuf,

        /// Start fresh, ignoring any saved checkpoint.
        #[arg(long)]
        no_resume: bool,
    },

    /// Retrieve matched entities, co-occurrence patterns and knowledge gaps.
    Query {
        /// Natural-language query.
        text: String,

        /// Maximum number of matched vertices.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum cosine similarity.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// List stored simplices containing an entity.
    Cofaces {
        /// Entity content, matched case-insensitively.
        content: String,
    },

    /// Show statistics for the user.
    Info,
}

const DEFAULT_DATA_DIR: &str = ".simplicial-memory";

fn load_config(cli: &Cli) -> Result<MemoryConfig> {
    let mut config = match cli.config {
        Some(ref path) => MemoryConfig::load(path)?,
        None => MemoryConfig::default(),
    };
    if let Some(ref dir) = cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if config.data_dir.is_none() {
        config.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
    }
    Ok(config)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let user = UserId(cli.user);
    let dimension = cli
        .dimension
        .or(config.embedding_dim)
        .unwrap_or(HashingEmbedder::DEFAULT_DIMENSION);
    let embedder = HashingEmbedder::new(dimension)?;

    match cli.command {
        Commands::Init => {
            let data_dir = config.data_dir.clone().unwrap_or_default();
            let engine = Engine::new(config)?;
            println!("Initialized simplicial memory at {}", data_dir.display());
            println!("{}", engine.info(user)?);
        }

        Commands::Ingest { file } => {
            let engine = Engine::new(config)?;
            let content = std::fs::read_to_string(&file).into_diagnostic()?;
            let mut observations: Vec<Observation> =
                serde_json::from_str(&content).into_diagnostic()?;
            for obs in &mut observations {
                obs.fill_embeddings(&embedder)?;
            }

            let report = engine.ingest(user, observations)?;
            println!("Ingested {}", file.display());
            println!("{report}");
            println!();
            println!("{}", engine.info(user)?);
        }

        Commands::IngestText { file, no_resume } => {
            let engine = Engine::new(config)?;
            let content = std::fs::read_to_string(&file).into_diagnostic()?;
            let items: Vec<TextObservation> = serde_json::from_str(&content).into_diagnostic()?;
            let extractor = DelimitedExtractor::new(embedder);

            let report = engine.ingest_text(user, items, &extractor, !no_resume)?;
            println!("Ingested {}", file.display());
            println!("{report}");
            println!();
            println!("{}", engine.info(user)?);
        }

        Commands::Query {
            text,
            top_k,
            threshold,
        } => {
            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            let threshold = threshold.unwrap_or(config.retrieval.similarity_threshold);
            let engine = Engine::new(config)?;

            let result = engine.query_text(user, &text, &embedder, top_k, threshold)?;
            println!("Query: {text}\n");
            if result.is_empty() {
                println!("No entities matched above similarity {threshold:.2}.");
            } else {
                println!("{}", result.render());
            }
        }

        Commands::Cofaces { content } => {
            let engine = Engine::new(config)?;
            let Some((vertex, cofaces)) = engine.cofaces_of_content(user, &content)? else {
                miette::bail!("no entity named \"{content}\" for {user}");
            };
            if cofaces.is_empty() {
                println!("{content} ({vertex}) appears in no stored simplex.");
                return Ok(());
            }
            let labels = engine.vertices().labels(
                cofaces.iter().flat_map(|c| c.vertices.iter().copied()),
            )?;
            println!("{} simplices contain {content} ({vertex}):", cofaces.len());
            for coface in &cofaces {
                let names: Vec<&str> = coface
                    .vertices
                    .iter()
                    .map(|v| labels.get(v).map(String::as_str).unwrap_or("?"))
                    .collect();
                let sources: Vec<&str> = coface.contexts.iter().map(|c| c.source.as_str()).collect();
                println!(
                    "  {} [{}] {{{}}}",
                    coface.leaf,
                    sources.join(", "),
                    names.join(", ")
                );
            }
        }

        Commands::Info => {
            let engine = Engine::new(config)?;
            println!("{}", engine.info(user)?);
        }
    }

    Ok(())
}
