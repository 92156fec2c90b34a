//! Trellis CLI
//!
//! Command-line interface for the Trellis memory graph: ingestion, queries,
//! maintenance sweeps and a long-running maintenance scheduler.

mod commands;
mod output;
mod scheduler;

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trellis_core::{DEFAULT_DB_FILE, EngineConfig, MemoryGraph};

/// Trellis - persistent memory graph
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Trellis memory graph")]
#[command(long_about = "Trellis stores typed memories in a weighted graph.\n\nRelevance decays over time, nodes are indexed over time/relevance/semantic axes, and similar memories are linked automatically.")]
pub struct Cli {
    /// Directory holding the database (defaults to the platform data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Decay curve: exponential, linear or logarithmic
    #[arg(long, global = true)]
    decay_function: Option<String>,

    /// Decay time unit: hour, day, week or month
    #[arg(long, global = true)]
    time_unit: Option<String>,

    /// Decay rate per time unit
    #[arg(long, global = true)]
    base_rate: Option<f64>,

    /// Prune threshold for relevance and strength
    #[arg(long, global = true)]
    min_relevance: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a node
    AddNode {
        /// Text content, or JSON with --json-content
        content: String,
        /// Node type (activity, pattern, resource, concept, project, workflow, email, code, external_reference, learning)
        #[arg(long = "type", default_value = "learning")]
        node_type: String,
        /// Source (event, pattern, user, system)
        #[arg(long, default_value = "user")]
        source: String,
        /// Parse content as JSON
        #[arg(long)]
        json_content: bool,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
        /// Initial relevance in [0, 1]
        #[arg(long)]
        relevance: Option<f64>,
        /// Observation time (RFC 3339)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Create an edge between two nodes
    AddEdge {
        source: String,
        target: String,
        /// Edge type (temporal, semantic, causal, spatial, reference, dependency, association)
        #[arg(long = "type", default_value = "association")]
        edge_type: String,
        #[arg(long, default_value = "")]
        context: String,
        #[arg(long, default_value = "0.5")]
        strength: f64,
        #[arg(long)]
        bidirectional: bool,
    },

    /// Show a node or edge
    Get { id: String },

    /// Record an access to a node, or an interaction with an edge
    Access {
        id: String,
        /// Treat the id as an edge
        #[arg(long)]
        edge: bool,
    },

    /// Query nodes by predicates
    Query {
        /// Node types (comma-separated)
        #[arg(long = "type")]
        node_types: Option<String>,
        /// Tags, any of (comma-separated)
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        min_relevance: Option<f64>,
        /// Substring of the serialized content
        #[arg(long)]
        contains: Option<String>,
        /// timestamp_desc, timestamp_asc, relevance_desc, created_desc or degree_desc
        #[arg(long, default_value = "timestamp_desc")]
        order: String,
        #[arg(long)]
        include_pruned: bool,
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Ranked spatial-temporal range query
    Spatial {
        /// Center as x,y,z
        #[arg(long)]
        center: Option<String>,
        #[arg(long)]
        radius: Option<f64>,
        /// Earliest node timestamp (RFC 3339)
        #[arg(long)]
        from: Option<String>,
        /// Latest node timestamp (RFC 3339)
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        min_relevance: Option<f64>,
        /// Node types (comma-separated)
        #[arg(long = "type")]
        node_types: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Find nodes similar to a node
    Similar {
        id: String,
        #[arg(long, default_value = "10")]
        limit: usize,
        #[arg(long, default_value = "0.3")]
        threshold: f64,
    },

    /// Link a node to its most similar peers with semantic edges
    Link {
        id: String,
        #[arg(long, default_value = "5")]
        max: usize,
    },

    /// Run a decay sweep
    Decay {
        /// Ignore the sweep interval
        #[arg(long)]
        force: bool,
    },

    /// Run a semantic linking sweep
    SemanticSweep {
        /// Ignore the sweep interval
        #[arg(long)]
        force: bool,
    },

    /// Restore full relevance and strength everywhere
    ResetDecay,

    /// Repair degrees, recompute analytics and rebuild the spatial index
    Optimize,

    /// Show graph statistics
    Stats,

    /// Show recent decay runs
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show the audit trail
    Audit {
        /// Restrict to one entity
        id: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Run decay and semantic sweeps on a schedule until interrupted
    Run {
        /// Minutes between decay sweeps (default: TRELLIS_DECAY_INTERVAL_MINUTES or config)
        #[arg(long)]
        decay_interval: Option<u64>,
        /// Minutes between semantic sweeps (default: TRELLIS_SEMANTIC_INTERVAL_MINUTES or config)
        #[arg(long)]
        semantic_interval: Option<u64>,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.with_ansi(false).init();
    }
}

impl Cli {
    /// File, then environment, then flags
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::load(self.config.as_deref())
            .with_context(|| match &self.config {
                Some(path) => format!("Failed to load config from {}", path.display()),
                None => "Invalid TRELLIS_* environment configuration".to_string(),
            })?;

        if let Some(f) = &self.decay_function {
            config.decay.decay_function = f.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(u) = &self.time_unit {
            config.decay.time_unit = u.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(rate) = self.base_rate {
            config.decay.base_rate = rate;
        }
        if let Some(min) = self.min_relevance {
            config.decay.minimum_relevance = min;
        }
        // The sweeps gate themselves on these, so the scheduler flags must land here
        if let Commands::Run {
            decay_interval,
            semantic_interval,
        } = &self.command
        {
            if let Some(minutes) = decay_interval {
                config.decay.sweep_interval_minutes = *minutes;
            }
            if let Some(minutes) = semantic_interval {
                config.similarity.sweep_interval_minutes = *minutes;
            }
        }
        config.validate().context("Invalid configuration flags")?;
        Ok(config)
    }

    fn db_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(DEFAULT_DB_FILE))
    }

    fn open(&self) -> anyhow::Result<MemoryGraph> {
        let config = self.engine_config()?;
        open_graph(self.db_path(), config)
    }
}

#[cfg(feature = "fastembed")]
fn open_graph(path: Option<PathBuf>, config: EngineConfig) -> anyhow::Result<MemoryGraph> {
    let provider = trellis_core::FastEmbedProvider::new().context("Failed to load embedding model")?;
    MemoryGraph::with_provider(path, config, std::sync::Arc::new(provider))
        .context("Failed to open memory graph")
}

#[cfg(not(feature = "fastembed"))]
fn open_graph(path: Option<PathBuf>, config: EngineConfig) -> anyhow::Result<MemoryGraph> {
    MemoryGraph::open(path, config).context("Failed to open memory graph")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let graph = cli.open()?;
    let json = cli.json;

    match cli.command {
        Commands::Run { .. } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            let intervals = scheduler::Intervals::from_config(graph.config());
            runtime.block_on(scheduler::run(graph, intervals))
        }
        command => commands::dispatch(&graph, command, json),
    }
}
