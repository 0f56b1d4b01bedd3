use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cscore_core::{ActivityRecord, CompanyProfile, FootprintResult, PeerObservation};
use cscore_engine::{ActionCatalog, ActionScorer, BenchmarkEngine, CalculationEngine, ScenarioSimulator};
use cscore_registry::{default_broad_groups, CorpusBuilder, FactorDraft, FactorRegistry};
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "cscore-cli")]
#[command(about = "CarbonScore calculation command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute a scoped footprint from activity records and a factor file.
    Calculate {
        /// JSON array of factor drafts to publish into the registry.
        #[arg(long)]
        factors: PathBuf,
        /// JSON file with activity records and the company profile.
        #[arg(long)]
        activities: PathBuf,
        /// Catalog resolution date, defaults to today.
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Position a computed footprint against a peer corpus.
    Benchmark {
        /// JSON footprint produced by `calculate`.
        #[arg(long)]
        footprint: PathBuf,
        #[arg(long)]
        activities: PathBuf,
        /// JSON array of anonymized peer observations.
        #[arg(long)]
        peers: PathBuf,
    },
    /// Rank reduction actions for a computed footprint.
    Score {
        #[arg(long)]
        footprint: PathBuf,
        /// YAML action catalog; the built-in bank when omitted.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Simulate applying a set of actions to a computed footprint.
    Simulate {
        #[arg(long)]
        footprint: PathBuf,
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Action ids to apply.
        #[arg(long = "action", required = true)]
        actions: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ActivityInput {
    records: Vec<ActivityRecord>,
    profile: CompanyProfile,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_action_catalog(path: Option<&PathBuf>) -> Result<ActionCatalog> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ActionCatalog::from_yaml_str(&text)
                .with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(ActionCatalog::builtin()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Calculate {
            factors,
            activities,
            as_of,
        } => {
            let drafts: Vec<FactorDraft> = read_json(&factors)?;
            let input: ActivityInput = read_json(&activities)?;

            let registry = FactorRegistry::new();
            for draft in drafts {
                registry.publish(draft)?;
            }
            let as_of = as_of.unwrap_or_else(|| chrono::Utc::now().date_naive());
            let catalog = registry.resolve_catalog(as_of);

            let engine = CalculationEngine::default();
            let result = engine.calculate(&input.records, &catalog, &input.profile)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            eprintln!(
                "total={} scope1={} scope2={} scope3={} failed_lines={} catalog={}",
                result.total,
                result.scope1,
                result.scope2,
                result.scope3,
                result.failed_lines.len(),
                result.catalog_id
            );
        }
        Commands::Benchmark {
            footprint,
            activities,
            peers,
        } => {
            let footprint: FootprintResult = read_json(&footprint)?;
            let input: ActivityInput = read_json(&activities)?;
            let observations: Vec<PeerObservation> = read_json(&peers)?;

            let mut builder = CorpusBuilder::new().with_broad_groups(default_broad_groups());
            builder.extend(observations);
            let corpus = builder.build();

            let result =
                BenchmarkEngine::default().benchmark(&footprint, &input.profile, &corpus)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Score { footprint, catalog } => {
            let footprint: FootprintResult = read_json(&footprint)?;
            let catalog = load_action_catalog(catalog.as_ref())?;
            let ranked = ActionScorer::default().score_actions(&footprint, &catalog)?;
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
        Commands::Simulate {
            footprint,
            catalog,
            actions,
        } => {
            let footprint: FootprintResult = read_json(&footprint)?;
            let catalog = load_action_catalog(catalog.as_ref())?;
            let result = ScenarioSimulator::default().simulate(&actions, &footprint, &catalog)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            eprintln!(
                "reduction={} residual={} applied={} skipped={}",
                result.total_reduction,
                result.residual_footprint.total,
                result.applied.len(),
                result.skipped_infeasible.len()
            );
        }
    }

    Ok(())
}
