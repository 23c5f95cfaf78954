//! Migrator - operator tool for migration manifests
//!
//! Usage:
//!   migrator summary [MANIFEST]     # Per-content-type progress
//!   migrator seed --previous PATH   # Start a new run from a previous run's manifest
//!   migrator check [MANIFEST]       # Verify a manifest loads and is consistent

mod config;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::MigratorConfig;
use migrator_logging::{init_logging, LogConfig};
use migrator_manifest::{Manifest, ManifestSerializer, MigrationStatus, PipelineProfile, PlanId};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "migrator", about = "Inspect and seed catalog migration manifests")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (defaults to <home>/migrator.toml)
    #[arg(long, global = true, env = "MIGRATOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show per-content-type status totals of a manifest
    Summary {
        /// Manifest file (defaults to the configured manifest_path)
        manifest: Option<PathBuf>,
    },

    /// Create the manifest for a new run from a previous run's manifest
    Seed {
        /// Manifest of the previous run
        #[arg(long)]
        previous: PathBuf,

        /// Where to write the new manifest (defaults to the configured manifest_path)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Plan of the new run (defaults to the previous run's plan)
        #[arg(long)]
        plan_id: Option<PlanId>,

        /// Pipeline profile (defaults to the configured profile)
        #[arg(long)]
        profile: Option<PipelineProfile>,

        /// Overwrite the output file if it exists
        #[arg(long)]
        force: bool,
    },

    /// Load a manifest and verify its entries and counters agree
    Check {
        /// Manifest file (defaults to the configured manifest_path)
        manifest: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "migrator",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = MigratorConfig::resolve(cli.config.as_deref())?;
    let serializer = ManifestSerializer::new().pretty(config.pretty);

    match cli.command {
        Commands::Summary { manifest } => {
            let path = manifest.unwrap_or_else(|| config.manifest_path.clone());
            let manifest = load_existing(&serializer, &path).await?;
            summarize(&manifest);
            Ok(())
        }
        Commands::Seed {
            previous,
            output,
            plan_id,
            profile,
            force,
        } => {
            let output = output.unwrap_or_else(|| config.manifest_path.clone());
            if output.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    output.display()
                );
            }
            let previous = load_existing(&serializer, &previous).await?;
            let plan_id = plan_id.unwrap_or_else(|| previous.plan_id());
            let profile = profile.unwrap_or(config.profile);

            let manifest = Manifest::from_previous(&previous, plan_id, profile)?;
            serializer
                .save(&manifest, &output)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "Seeded {} with {} entries (migration {})",
                output.display(),
                manifest.entries().len(),
                manifest.migration_id()
            );
            Ok(())
        }
        Commands::Check { manifest } => {
            let path = manifest.unwrap_or_else(|| config.manifest_path.clone());
            let manifest = load_existing(&serializer, &path).await?;
            let problems = check(&manifest);
            if problems.is_empty() {
                println!(
                    "{}: OK ({} entries, schema v{})",
                    path.display(),
                    manifest.entries().len(),
                    manifest.schema_version()
                );
                return Ok(());
            }
            for problem in &problems {
                println!("  {}", problem);
            }
            bail!("{}: {} problem(s) found", path.display(), problems.len())
        }
    }
}

async fn load_existing(serializer: &ManifestSerializer, path: &Path) -> Result<Manifest> {
    serializer
        .load(path)
        .await
        .with_context(|| format!("Failed to load manifest {}", path.display()))?
        .with_context(|| format!("No manifest at {}", path.display()))
}

fn summarize(manifest: &Manifest) {
    println!("Plan:       {}", manifest.plan_id());
    println!("Migration:  {}", manifest.migration_id());
    println!("Profile:    {}", manifest.profile());
    println!("Schema:     v{}", manifest.schema_version());
    println!();

    let rows: Vec<_> = manifest
        .entries()
        .partitions()
        .into_iter()
        .map(|partition| {
            (
                partition.content_type().to_string(),
                partition.len(),
                partition.status_totals(),
            )
        })
        .collect();
    if rows.is_empty() {
        println!("No entries.");
    } else {
        println!("{}", output::status_table(&rows));
    }

    let errors = manifest.top_level_errors();
    if !errors.is_empty() {
        println!();
        println!("Run errors ({}):", errors.len());
        for err in errors {
            println!("  [{}] {}", err.kind(), err);
        }
    }
}

/// Cross-check every entry against its partition's indices and counters.
fn check(manifest: &Manifest) -> Vec<String> {
    let mut problems = Vec::new();

    for partition in manifest.entries().partitions() {
        let content_type = partition.content_type();
        let mut counted = migrator_manifest::StatusTotals::new();

        for entry in partition.entries() {
            *counted.entry(entry.status()).or_default() += 1;
            let mapped = entry.mapped_location();

            if let Some(destination) = entry.destination() {
                if *destination.location() != mapped {
                    problems.push(format!(
                        "{}: {} destination {} differs from mapped location {}",
                        content_type,
                        entry.source(),
                        destination.location(),
                        mapped
                    ));
                }
                let indexed = partition.by_destination_id(destination.id());
                if destination.has_id() && !indexed.is_some_and(|e| e.ptr_eq(&entry)) {
                    problems.push(format!(
                        "{}: {} not indexed by destination id",
                        content_type,
                        entry.source()
                    ));
                }
            }
            if entry.status() == MigrationStatus::Error && entry.errors().is_empty() {
                warn!(%content_type, source = %entry.source(), "Failed entry has no recorded errors");
            }
        }

        let totals = partition.status_totals();
        for status in MigrationStatus::ALL {
            let expected = counted.get(&status).copied().unwrap_or(0);
            let actual = totals.get(&status).copied().unwrap_or(0);
            if expected != actual {
                problems.push(format!(
                    "{}: {} counter is {} but {} entries have that status",
                    content_type, status, actual, expected
                ));
            }
        }
    }

    info!(problems = problems.len(), "Manifest check finished");
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrator_manifest::{ContentLocation, ContentReference, ContentType};

    fn reference(path: &str) -> ContentReference {
        ContentReference::new(uuid::Uuid::new_v4(), ContentLocation::from_path(path))
    }

    #[test]
    fn test_check_accepts_consistent_manifest() {
        let manifest = Manifest::new(PlanId::new(), PipelineProfile::ServerToCloud);
        let partition = manifest.partition(ContentType::Project);
        let entries =
            partition.create_entries(&[reference("Server/A"), reference("Server/B")], |_, e| e.clone());
        entries[0].destination_found(reference("Cloud/A"));
        entries[0].set_migrated();
        entries[1].set_skipped("excluded by filter");

        assert!(check(&manifest).is_empty());
    }

    #[test]
    fn test_cli_parses_seed() {
        let cli = Cli::try_parse_from([
            "migrator",
            "seed",
            "--previous",
            "old.json",
            "--profile",
            "cloud-to-cloud",
        ])
        .unwrap();
        match cli.command {
            Commands::Seed {
                previous, profile, ..
            } => {
                assert_eq!(previous, PathBuf::from("old.json"));
                assert_eq!(profile, Some(PipelineProfile::CloudToCloud));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_seed_round_trip_through_files() {
        let tmp = tempfile::tempdir().unwrap();
        let previous_path = tmp.path().join("previous.json");
        let serializer = ManifestSerializer::new();

        let previous = Manifest::new(PlanId::new(), PipelineProfile::ServerToCloud);
        previous
            .partition(ContentType::User)
            .create_entries(&[reference("local/alice")], |_, e| e.set_migrated());
        serializer.save(&previous, &previous_path).await.unwrap();

        let loaded = load_existing(&serializer, &previous_path).await.unwrap();
        let seeded =
            Manifest::from_previous(&loaded, loaded.plan_id(), PipelineProfile::ServerToCloud).unwrap();
        assert_eq!(seeded.entries(), previous.entries());
        assert_ne!(seeded.migration_id(), previous.migration_id());

        let missing = load_existing(&serializer, &tmp.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("No manifest"));
    }
}
