//! CLI interface for synergy-engine

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::catalog::CatalogLoader;
use crate::composition::TraitIndex;
use crate::config::{self, EngineConfig};
use crate::engine::AdaptiveEngine;
use crate::learning::LoadOutcome;
use crate::types::{OutcomeMetrics, RawOutcomeMetrics};

#[derive(Parser)]
#[command(name = "synergy-engine")]
#[command(about = "Compose capability units, learn from outcomes and score breakthroughs", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SYNERGY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Capability catalog (JSON or YAML)
    #[arg(long, env = "SYNERGY_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    /// Learning snapshot file
    #[arg(long, env = "SYNERGY_SNAPSHOT", global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank catalog units against a request
    Search {
        /// Request text
        query: String,
        /// Maximum results to return
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// List the indexed units of one catalog owner
    Units {
        /// Owner id
        owner: String,
    },
    /// Compose a synergistic unit set for a task
    Compose {
        /// Task description
        task: String,
        /// Maximum units (defaults to config)
        #[arg(short, long)]
        max: Option<usize>,
        /// Run per-unit perspectives concurrently and merge them
        #[arg(long)]
        synthesize: bool,
    },
    /// Record the outcome of using one or more units
    Record {
        /// Units involved
        #[arg(required = true)]
        units: Vec<String>,
        /// The task failed
        #[arg(long)]
        failed: bool,
        #[command(flatten)]
        outcome: OutcomeArgs,
    },
    /// Score an outcome for breakthrough significance
    Analyze {
        /// Units involved
        #[arg(required = true)]
        units: Vec<String>,
        #[command(flatten)]
        outcome: OutcomeArgs,
        /// Also learn from the outcome (and reinforce it if it is a breakthrough)
        #[arg(long)]
        record: bool,
        /// The task failed (only used with --record)
        #[arg(long)]
        failed: bool,
    },
    /// Best unit combination for context keywords
    Optimal {
        /// Context keywords
        keywords: Vec<String>,
        /// Number of units
        #[arg(short, long, default_value = "3")]
        max: usize,
    },
    /// List discovered emergent combinations
    Patterns,
    /// Show learning statistics
    Stats,
    /// Show or initialise configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
        /// Write a default config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct OutcomeArgs {
    /// Task completion (0-1)
    #[arg(long)]
    completion: Option<f64>,
    /// Accuracy (0-1)
    #[arg(long)]
    accuracy: Option<f64>,
    /// Efficiency gain (1.0 = no change)
    #[arg(long)]
    gain: Option<f64>,
    /// Free-text context of the outcome
    #[arg(long, default_value = "")]
    context: String,
}

impl OutcomeArgs {
    fn metrics(&self) -> OutcomeMetrics {
        OutcomeMetrics::from_raw(&RawOutcomeMetrics {
            task_completion: self.completion,
            accuracy: self.accuracy,
            efficiency_gain: self.gain,
        })
    }
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load()?,
    };

    if let Commands::Config { show, init } = &cli.command {
        return config_command(&cli, &config, *show, *init);
    }

    let snapshot_path = match &cli.snapshot {
        Some(path) => path.clone(),
        None => config.snapshot_path()?,
    };
    let engine = build_engine(&cli, config)?;

    match engine.load(&snapshot_path).await {
        LoadOutcome::Corrupt(reason) => {
            eprintln!("Warning: ignoring corrupt snapshot ({}), starting fresh", reason);
        }
        outcome => debug!("Snapshot load: {:?}", outcome),
    }

    match cli.command {
        Commands::Search { query, limit } => {
            let results = engine.search(&query, limit).await;
            if results.is_empty() {
                println!("No units matched.");
            }
            for (rank, hit) in results.iter().enumerate() {
                println!(
                    "{:>2}. {:<30} score {:.2}  expertise {:>5.1}  [{}]",
                    rank + 1,
                    hit.unit.key(),
                    hit.score,
                    hit.unit.expertise,
                    hit.matched_triggers.join(", ")
                );
            }
        }
        Commands::Units { owner } => {
            let units = engine.units_by_owner(&owner).await;
            if units.is_empty() {
                println!("No units indexed for owner '{}'.", owner);
            }
            for unit in &units {
                println!(
                    "{:<30} expertise {:>5.1}  triggers [{}]  domains [{}]",
                    unit.name,
                    unit.expertise,
                    unit.triggers.join(", "),
                    unit.domains.join(", ")
                );
            }
        }
        Commands::Compose { task, max, synthesize } => {
            let max = max.unwrap_or(engine.config().composition.default_max_traits);
            let agent = engine
                .compose_agent(&task, max)
                .await
                .context("Composition needs a catalog (use --catalog or persistence.catalog_path)")?;

            if agent.is_empty() {
                println!("No units matched the task.");
                return Ok(());
            }
            println!("Agent {}", agent.id);
            println!("  Units:        {}", agent.unit_names().join(", "));
            println!("  Owners:       {}", agent.owners_used.join(", "));
            println!(
                "  Domains:      {}",
                agent.knowledge_domains.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            println!("  Synergy:      {:.2}", agent.synergy_score);
            println!("  Optimization: {:.2}", agent.optimization_score);
            println!("  Confidence:   {:.2}", agent.confidence());

            if synthesize {
                let report = engine.synthesize(agent, Vec::new(), None).await;
                println!("\nSynthesis (confidence {:.2})", report.confidence);
                for insight in &report.insights {
                    println!("  - {}", insight.summary);
                }
                for failure in &report.failed {
                    println!("  ! {} failed: {}", failure.label, failure.reason);
                }
                for note in &report.notes {
                    println!("  * {}", note);
                }
            }
        }
        Commands::Record { units, failed, outcome } => {
            let metrics = outcome.metrics();
            let result = engine
                .record_enhanced_outcome(&units, !failed, &metrics, &outcome.context)
                .await;
            for (name, score) in &result.effectiveness {
                println!("{:<30} effectiveness {:.3}", name, score);
            }
            if let Some(key) = &result.relationships.discovered {
                println!("Emergent combination discovered: {}", key);
            }
            if let Some(key) = &result.relationships.reinforced {
                println!("Emergent combination reinforced: {}", key);
            }
            save(&engine, &snapshot_path).await?;
        }
        Commands::Analyze { units, outcome, record, failed } => {
            let metrics = outcome.metrics();
            if record {
                let processed = engine
                    .process_outcome(&units, !failed, &metrics, &outcome.context)
                    .await;
                print!("{}", engine.scorer().generate_report(&processed.analysis));
                if processed.is_breakthrough && !failed {
                    println!("Breakthrough reinforced for {}", units.join(", "));
                }
                save(&engine, &snapshot_path).await?;
            } else {
                let analysis = engine.analyze(&metrics, &outcome.context, &units).await;
                print!("{}", engine.scorer().generate_report(&analysis));
            }
        }
        Commands::Optimal { keywords, max } => {
            let combination = engine.get_optimal_combination(&keywords, max).await;
            if combination.is_empty() {
                println!("No units available.");
            } else {
                println!("{}", combination.join(" + "));
            }
        }
        Commands::Patterns => {
            let patterns = engine.get_emergent_patterns().await;
            if patterns.is_empty() {
                println!("No emergent combinations discovered yet.");
            }
            for (key, pattern) in &patterns {
                println!(
                    "{:<40} {:.2}x  seen {} times  since {}  ({})",
                    key,
                    pattern.effectiveness,
                    pattern.activation_frequency,
                    pattern.discovered_at.format("%Y-%m-%d %H:%M"),
                    pattern.discovery_context
                );
            }
        }
        Commands::Stats => {
            let stats = engine.get_stats().await;
            let analytics = engine.composition_analytics().await;
            println!("Units:                 {}", stats.total_units);
            println!("Average effectiveness: {:.3}", stats.average_effectiveness);
            println!("Adaptations:           {}", stats.total_adaptations);
            println!("Relationships:         {}", stats.relationships);
            println!("Emergent combinations: {}", stats.emergent_combinations);
            println!(
                "Last update:           {}",
                stats
                    .last_update
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string())
            );
            if analytics.total_compositions > 0 {
                println!("Compositions:          {}", analytics.total_compositions);
            }
        }
        Commands::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn build_engine(cli: &Cli, config: EngineConfig) -> Result<AdaptiveEngine> {
    let catalog_path = cli
        .catalog
        .clone()
        .or_else(|| config.persistence.catalog_path.clone());

    match catalog_path {
        Some(path) => {
            let catalog = CatalogLoader::load(&path)
                .with_context(|| format!("Failed to load catalog from {}", path.display()))?;
            let issues = catalog.units().1;
            for issue in &issues {
                eprintln!("Warning: skipped catalog entry {}", issue);
            }
            AdaptiveEngine::from_catalog(config, &catalog).context("Invalid configuration")
        }
        None => {
            let index = TraitIndex::new(config.search.clone());
            AdaptiveEngine::new(config, index).context("Invalid configuration")
        }
    }
}

async fn save(engine: &AdaptiveEngine, path: &Path) -> Result<()> {
    engine
        .save_with_retry(path)
        .await
        .with_context(|| format!("Failed to save snapshot to {}", path.display()))
}

fn config_command(cli: &Cli, config: &EngineConfig, show: bool, init: bool) -> Result<()> {
    if init {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => config::config_path()?,
        };
        if path.exists() {
            anyhow::bail!("Config already exists at {}", path.display());
        }
        EngineConfig::default()
            .save_to(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default config to {}", path.display());
    }
    if show || !init {
        let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
        println!("{}", rendered);
    }
    Ok(())
}
