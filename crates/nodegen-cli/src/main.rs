use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nodegen::{load_input, render_inspection, render_summary, PlanDocument};
use nodegen_core::{NodegenConfig, Pipeline};

#[derive(Parser)]
#[command(name = "nodegen")]
#[command(about = "Plan node implementations from annotated interface hierarchies", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "NODEGEN_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan every IMPL spec of an input document
    Plan {
        /// Input document (JSON or TOML)
        #[arg(short, long)]
        input: PathBuf,

        /// Planner configuration (TOML)
        #[arg(short, long, env = "NODEGEN_CONFIG")]
        config: Option<PathBuf>,

        /// Write the plans as JSON to this file instead of printing a summary
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Plan independent specs in parallel
        #[arg(long)]
        concurrent: bool,

        /// Worker count for --concurrent, overriding the configuration
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show the ancestor order and merged members of one spec
    Inspect {
        /// Input document (JSON or TOML)
        #[arg(short, long)]
        input: PathBuf,

        /// Identity of the spec to inspect
        #[arg(short, long)]
        spec: String,

        /// Planner configuration (TOML)
        #[arg(short, long, env = "NODEGEN_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the order in which IMPL specs are planned
    Order {
        /// Input document (JSON or TOML)
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    // RUST_LOG wins over the flags when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match cli.command {
        Commands::Plan {
            input,
            config,
            output,
            concurrent,
            workers,
        } => handle_plan(&input, config.as_deref(), output.as_deref(), concurrent, workers).await,
        Commands::Inspect {
            input,
            spec,
            config,
        } => handle_inspect(&input, &spec, config.as_deref()),
        Commands::Order { input } => handle_order(&input),
    }
}

fn load_config(path: Option<&Path>) -> Result<NodegenConfig> {
    match path {
        Some(path) => NodegenConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(NodegenConfig::default()),
    }
}

async fn handle_plan(
    input: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
    concurrent: bool,
    workers: Option<usize>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(workers) = workers {
        config = config.with_workers(workers);
        config.validate().context("Invalid --workers")?;
    }

    let loaded = load_input(input)?;
    let pipeline =
        Pipeline::from_specs(loaded.specs, config).with_extraction_diagnostics(loaded.diagnostics);
    let report = if concurrent {
        pipeline.run_concurrent().await
    } else {
        pipeline.run()
    };

    match output {
        Some(path) => {
            let document = PlanDocument::new(&report);
            let json = serde_json::to_string_pretty(&document)?;
            fs::write(path, json)
                .with_context(|| format!("Failed to write plans to {}", path.display()))?;
            info!("Wrote {} plans to {}", report.registry().len(), path.display());
        }
        None => print!("{}", render_summary(&report)),
    }

    let summary = report.summary();
    if summary.flagged > 0 {
        warn!("{} specs were planned with errors", summary.flagged);
    }
    if report.has_failures() {
        anyhow::bail!("{} specs could not be planned", summary.failed);
    }
    Ok(())
}

fn handle_inspect(input: &Path, spec: &str, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let loaded = load_input(input)?;
    let pipeline = Pipeline::from_specs(loaded.specs, config);

    let (ancestry, merged) = pipeline
        .inspect(spec)
        .with_context(|| format!("Spec {} is not part of {}", spec, input.display()))?;
    print!("{}", render_inspection(&ancestry, &merged));
    Ok(())
}

fn handle_order(input: &Path) -> Result<()> {
    let loaded = load_input(input)?;
    let pipeline = Pipeline::from_specs(loaded.specs, NodegenConfig::default());
    for id in pipeline.impl_order() {
        println!("{}", id);
    }
    Ok(())
}
