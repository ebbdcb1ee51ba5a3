use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use rinkhouse::config::PipelineThresholds;
use rinkhouse::domain::{RunStatus, Tier};
use rinkhouse::logging::init_logging;
use rinkhouse::pipeline::export::SnapshotStore;
use rinkhouse::pipeline::orchestrator::{PipelineOrchestrator, PipelineRunResult};
use rinkhouse::pipeline::processing::validate::GroundTruthSet;
use rinkhouse::registry::dimension_loader;
use rinkhouse::source::{JsonFileSource, RawSource};

#[derive(Parser)]
#[command(name = "rinkhouse")]
#[command(about = "Analytics warehouse pipeline for manually tracked hockey games")]
#[command(version = "0.1.0")]
struct Cli {
    /// JSON file of raw game tables handed over by the ingestion layer
    #[arg(long)]
    input: PathBuf,

    /// Directory of dimension registry JSON files
    #[arg(long)]
    registry: PathBuf,

    /// Threshold configuration TOML; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wipe derived output and rebuild everything from the raw sources
    Rebuild {
        /// File holding the accepted snapshot digest to verify against
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Accept an intentional divergence and update the accepted digest
        #[arg(long)]
        accept_divergence: bool,
        /// Where to write the exported warehouse tables
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Process only new or changed games (comma-separated game ids)
    Incremental {
        #[arg(long)]
        games: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the full pipeline and report findings without writing anything
    Validate,
    /// Full pipeline plus comparison against a curated reference dataset
    GroundTruth {
        #[arg(long)]
        reference: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    // Configuration errors fail the run before any processing begins.
    let thresholds = match &cli.config {
        Some(path) => PipelineThresholds::load(path)?,
        None => PipelineThresholds::default(),
    };
    let registry = dimension_loader::load_from_directory(&cli.registry)?;
    let games = JsonFileSource::new(&cli.input).games()?;
    info!("loaded {} game(s) and a registry snapshot", games.len());

    let orchestrator = PipelineOrchestrator::new(registry, thresholds)?;

    let result = match &cli.command {
        Commands::Rebuild { snapshot, accept_divergence, out } => {
            let prior = match snapshot {
                Some(path) if path.exists() => Some(SnapshotStore::read_digest(path)?),
                Some(_) => {
                    warn!("no accepted snapshot yet, this run establishes the baseline");
                    None
                }
                None => None,
            };
            let result = orchestrator
                .verify_rebuild(games, prior.as_deref(), *accept_divergence)
                .await?;

            if result.status() != RunStatus::Failed {
                if let Some(path) = out {
                    orchestrator.export(&result.games).write_to(path)?;
                    info!("exported warehouse tables to {}", path.display());
                }
                if let Some(path) = snapshot {
                    SnapshotStore::write_digest(path, &result.digest)?;
                }
            }
            result
        }
        Commands::Incremental { games: changed, out } => {
            let changed_ids: Vec<String> =
                changed.split(',').map(|s| s.trim().to_string()).collect();
            let result = orchestrator.run_incremental(games, &changed_ids).await?;
            if result.status() != RunStatus::Failed {
                if let Some(path) = out {
                    orchestrator.export(&result.games).write_to(path)?;
                }
            }
            result
        }
        Commands::Validate => orchestrator.run_full(games).await?,
        Commands::GroundTruth { reference } => {
            let reference = GroundTruthSet::load(reference)?;
            orchestrator.run_ground_truth(games, reference).await?
        }
    };

    print_summary(&result);

    if result.status() == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(result: &PipelineRunResult) {
    println!("\n📊 Run {} ({})", result.run_id, result.pipeline_name);
    println!("   Status: {}", result.status());
    println!("   Games: {}", result.games.len());
    println!(
        "   Facts: {}",
        result.games.iter().map(|g| g.facts.len()).sum::<usize>()
    );
    println!("   Snapshot digest: {}", result.digest);

    let mut step_names: Vec<_> = result.step_totals.keys().collect();
    step_names.sort();
    for name in step_names {
        let totals = result.step_totals[name];
        println!(
            "   Step {}: {} processed, {} warnings",
            name, totals.processed, totals.warnings
        );
    }

    for tier in [Tier::Blocking, Tier::Warning, Tier::Informational] {
        let findings: Vec<_> = result.report.findings_at(tier).collect();
        if findings.is_empty() {
            continue;
        }
        println!("\n   {:?} findings ({}):", tier, findings.len());
        for finding in findings {
            println!(
                "   - [{}] {} ({}{})",
                finding.rule_id,
                finding.message,
                finding.table,
                finding
                    .row_ref
                    .as_deref()
                    .map(|r| format!(" @ {}", r))
                    .unwrap_or_default()
            );
        }
    }
}
