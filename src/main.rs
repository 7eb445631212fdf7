mod console;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tilewalk_core::config::AppConfig;
use tilewalk_core::event::EventBus;
use tilewalk_core::graph::WorkflowGraph;
use tilewalk_core::types::{TileKind, WorkflowData, WorkflowStatus};

use tilewalk_engine::{PromptBroker, WorkflowManager};
use tilewalk_tiles::{ReqwestHttpClient, Tile, TileExecutor};

const DEFAULT_CONFIG: &str = "tilewalk.toml";

#[derive(Parser)]
#[command(name = "tilewalk", version, about = "Run tile-based workflow graphs")]
struct Cli {
    /// Path to config file (defaults to ./tilewalk.toml when present)
    #[arg(short, long, env = "TILEWALK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow graph until it terminates
    Run {
        /// Workflow graph JSON file
        graph: PathBuf,
        /// Workflow instance id (auto-generated if not provided)
        #[arg(long)]
        id: Option<String>,
        /// Initial workflow data as a JSON object
        #[arg(long)]
        data: Option<String>,
        /// Override engine.max_steps (at least 1)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_steps: Option<u64>,
        /// Mark the run failed when a tile ends it because of an error
        #[arg(long)]
        fail_on_tile_error: bool,
    },
    /// Check a workflow graph without running it
    Validate {
        /// Workflow graph JSON file
        graph: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "tilewalk", &mut std::io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => AppConfig::load(Path::new(DEFAULT_CONFIG))?,
        None => AppConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            graph,
            id,
            data,
            max_steps,
            fail_on_tile_error,
        } => {
            let mut config = config;
            if let Some(max_steps) = max_steps {
                config.engine.max_steps = usize::try_from(max_steps)?;
            }
            if fail_on_tile_error {
                config.engine.fail_on_tile_error = true;
            }
            block_on_detached(run_workflow(&config, &graph, id, data.as_deref()))??;
        }
        Commands::Validate { graph } => validate(&graph)?,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Drive `future` on a fresh runtime and return without joining blocking
/// tasks. A terminal prompt stuck in `spawn_blocking` would otherwise keep
/// the process alive after the workflow has finished.
fn block_on_detached<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

async fn run_workflow(
    config: &AppConfig,
    graph_path: &Path,
    id: Option<String>,
    data: Option<&str>,
) -> anyhow::Result<()> {
    let graph = WorkflowGraph::load(graph_path)?;
    for dangling in graph.dangling_references() {
        warn!(
            tile_id = ?dangling.tile_id,
            field = %dangling.field,
            target = %dangling.target,
            "Graph references a missing tile"
        );
    }

    let initial = match data {
        Some(raw) => WorkflowData::from_value(serde_json::from_str(raw)?)?,
        None => WorkflowData::new(),
    };

    let event_bus = Arc::new(EventBus::from_config(&config.engine));
    let broker = Arc::new(PromptBroker::new(event_bus.clone()));
    let http = Arc::new(ReqwestHttpClient::new(&config.http)?);
    let executor = Arc::new(TileExecutor::with_config(
        broker.clone(),
        http,
        event_bus.clone(),
        config,
    ));
    let manager = WorkflowManager::new(executor, event_bus.clone(), config.engine.clone());

    let console = tokio::spawn(console::follow(event_bus.subscribe(), broker));

    let workflow_id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(workflow_id = %workflow_id, graph = %graph_path.display(), "Running workflow");
    manager.start(&workflow_id, graph, initial).await?;

    let state = tokio::select! {
        state = manager.wait(&workflow_id) => state?,
        _ = tokio::signal::ctrl_c() => {
            manager.stop(&workflow_id).await?;
            console.abort();
            anyhow::bail!("workflow {} interrupted", workflow_id);
        }
    };
    console.abort();

    println!("{}", serde_json::to_string_pretty(&state)?);
    if state.status == WorkflowStatus::Failed {
        anyhow::bail!(
            "workflow {} failed: {}",
            workflow_id,
            state.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn validate(graph_path: &Path) -> anyhow::Result<()> {
    let graph = WorkflowGraph::load(graph_path)?;
    println!(
        "{}: {} tiles, start tile {}",
        graph.name().unwrap_or("workflow"),
        graph.len(),
        graph.start_tile()
    );

    let mut problems = 0;
    for tile in graph.tiles() {
        match tile.tile_type.parse::<TileKind>() {
            Ok(kind) => {
                let (_, report) = Tile::configure(kind, &tile.configuration);
                if !report.defaulted.is_empty() {
                    println!("  {} ({}): defaults for {}", tile.id, kind, report.defaulted.join(", "));
                }
            }
            Err(e) => {
                problems += 1;
                println!("  {}: {}", tile.id, e);
            }
        }
    }

    for dangling in graph.dangling_references() {
        problems += 1;
        match dangling.tile_id {
            Some(tile_id) => println!(
                "  {}: {} points at missing tile {}",
                tile_id, dangling.field, dangling.target
            ),
            None => println!("  {} points at missing tile {}", dangling.field, dangling.target),
        }
    }

    if problems > 0 {
        anyhow::bail!("{} problem(s) found in {}", problems, graph_path.display());
    }
    println!("ok");
    Ok(())
}
