//! topoloc: offline maintenance of place-graph maps.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rust_topoloc::config::Config;
use rust_topoloc::graph::{NodeId, PlaceGraph};
use rust_topoloc::loop_closing::SimilarityMatrix;
use rust_topoloc::maintenance;

#[derive(Parser)]
#[command(name = "topoloc", version, about = "Place-graph map maintenance")]
struct Cli {
    /// YAML configuration overriding the defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show map statistics.
    Info { map: PathBuf },

    /// Fold place DROP into place KEEP.
    Merge { map: PathBuf, keep: u32, drop: u32 },

    /// Remove the edges between A and B, both directions.
    RemoveEdge { map: PathBuf, a: u32, b: u32 },

    /// Merge places X0..=X1 with places Y0..=Y1.
    Join {
        map: PathBuf,
        x0: u32,
        x1: u32,
        y0: u32,
        y1: u32,
    },

    /// Batch loop closure over a similarity matrix, then renumber.
    Recompute {
        map: PathBuf,
        /// Similarity matrix text file.
        matrix: PathBuf,
    },

    /// Reassign dense ids, oldest place first.
    Renumber { map: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Info { map } => {
            let graph = load(&map)?;
            let summary = maintenance::summarize(&graph);
            println!("places:      {}", summary.nodes);
            println!("edges:       {} ({} open)", summary.edges, summary.open_edges);
            println!("checkpoints: {}", summary.checkpoints);
            println!("dense ids:   {}", summary.dense);
            for (id, label) in &summary.labels {
                println!("  {:>5}  {}", id, label);
            }
        }
        Commands::Merge { map, keep, drop } => {
            let mut graph = load(&map)?;
            maintenance::merge_nodes_by_id(&mut graph, NodeId::new(keep), NodeId::new(drop))
                .with_context(|| format!("failed to merge {} into {}", drop, keep))?;
            save(&map, &graph)?;
        }
        Commands::RemoveEdge { map, a, b } => {
            let mut graph = load(&map)?;
            maintenance::remove_edge_by_id(&mut graph, NodeId::new(a), NodeId::new(b))
                .with_context(|| format!("failed to remove edge {} - {}", a, b))?;
            save(&map, &graph)?;
        }
        Commands::Join { map, x0, x1, y0, y1 } => {
            let mut graph = load(&map)?;
            let report = maintenance::join_nodes(&mut graph, x0, x1, y0, y1)
                .with_context(|| format!("failed to join {}..={} with {}..={}", x0, x1, y0, y1))?;
            println!("merged {} places, {} skipped", report.merged, report.skipped);
            save(&map, &graph)?;
        }
        Commands::Recompute { map, matrix } => {
            let mut graph = load(&map)?;
            let sim = SimilarityMatrix::read(&matrix)
                .with_context(|| format!("failed to read similarity matrix {}", matrix.display()))?;
            let report = maintenance::batch_recompute(&mut graph, &sim, &config.alignment)
                .context("batch loop closure failed")?;
            let remapped = sim.remap(&report.id_map, graph.node_count());
            println!(
                "{} components, {} places merged, {} places left",
                report.components.len(),
                report.merge.merged,
                graph.node_count()
            );
            maintenance::save_map(&map, &graph, Some(&remapped))
                .with_context(|| format!("failed to save map {}", map.display()))?;
        }
        Commands::Renumber { map } => {
            let mut graph = load(&map)?;
            maintenance::renumber(&mut graph);
            save(&map, &graph)?;
        }
    }
    Ok(())
}

fn load(path: &Path) -> Result<PlaceGraph> {
    PlaceGraph::load(path).with_context(|| format!("failed to load map {}", path.display()))
}

fn save(path: &Path, graph: &PlaceGraph) -> Result<()> {
    maintenance::save_map(path, graph, None).with_context(|| format!("failed to save map {}", path.display()))
}
