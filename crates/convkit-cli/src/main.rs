//! convkit - fetch model weights and export them for the web.
//!
//! Thin driver around `convkit-core`: builds a [`PipelineConfig`] from the
//! command line, prepares the export backend and runs the pipeline once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use convkit_core::{
    catalog_status, ArtifactStore, Catalog, ConversionOrchestrator, ExportBackend, HttpFetcher,
    ModelStatus, PipelineConfig, RunSummary, UltralyticsBackend,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "convkit")]
#[command(about = "Fetch model weights and export them to TensorFlow.js")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Working directory (defaults to the current directory)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Models directory (defaults to <work-dir>/models)
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// JSON catalog file (defaults to the built-in YOLO catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Copy installed exports to <publish-dir>/<id>/ after the run
    #[arg(long, global = true)]
    publish_dir: Option<PathBuf>,

    /// Python interpreter with ultralytics installed, instead of the managed venv
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Do not create or update the export environment before running
    #[arg(long, global = true)]
    skip_setup: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Fetch, sweep, export and install every model (default)
    Run,
    /// Show which artifacts exist for every model
    Status,
    /// Prepare the export environment only
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let work_dir = match &args.work_dir {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Could not determine current directory")?,
    };
    info!("Working directory: {}", work_dir.display());

    let config = build_config(&args, &work_dir)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Setup => {
            build_backend(&args, &work_dir)
                .ensure_environment()
                .await
                .context("Export environment setup failed")?;
            info!("Export environment ready");
        }
        Command::Status => {
            let store = ArtifactStore::new(&config.models_dir);
            print_status(&catalog_status(&store, &config.catalog), args.json)?;
        }
        Command::Run => {
            let backend = build_backend(&args, &work_dir);
            if !args.skip_setup {
                backend
                    .ensure_environment()
                    .await
                    .context("Export environment setup failed")?;
            }
            let orchestrator = orchestrator(config, backend)?;
            let summary = orchestrator.run().await?;
            print_summary(&summary, args.json)?;
        }
    }

    Ok(())
}

fn build_config(args: &Args, work_dir: &Path) -> Result<PipelineConfig> {
    let catalog = match &args.catalog {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Could not load catalog {}", path.display()))?,
        None => Catalog::default(),
    };

    let config = match &args.models_dir {
        Some(models_dir) => PipelineConfig::with_models_dir(work_dir, models_dir, catalog),
        None => PipelineConfig::new(work_dir, catalog),
    };
    Ok(match &args.publish_dir {
        Some(dir) => config.with_publish_dir(dir),
        None => config,
    })
}

fn build_backend(args: &Args, work_dir: &Path) -> UltralyticsBackend {
    let backend = UltralyticsBackend::new(work_dir);
    match &args.python {
        Some(python) => backend.with_interpreter(python),
        None => backend,
    }
}

fn orchestrator(
    config: PipelineConfig,
    backend: UltralyticsBackend,
) -> Result<ConversionOrchestrator> {
    let fetcher = HttpFetcher::new().context("Could not create HTTP client")?;
    Ok(ConversionOrchestrator::new(
        config,
        Arc::new(fetcher),
        Arc::new(backend),
    ))
}

// Results go to stdout, logs go through tracing.
fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    for report in &summary.models {
        match report.outcome.error() {
            Some(error) => println!("{:<20} {:<16} {}", report.model_id, report.outcome.label(), error),
            None => println!("{:<20} {}", report.model_id, report.outcome.label()),
        }
    }
    println!(
        "{} downloaded, {} complete, {} installed, {} failed, {} stale files removed",
        summary.downloaded(),
        summary.complete(),
        summary.installed(),
        summary.failed(),
        summary.sweep.removed.len()
    );
    if let Some(publish) = &summary.publish {
        println!(
            "{} published, {} failed to publish",
            publish.published.len(),
            publish.failed.len()
        );
    }
    Ok(())
}

fn print_status(statuses: &[ModelStatus], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(statuses)?);
        return Ok(());
    }

    for status in statuses {
        let state = if status.is_complete() { "complete" } else { "incomplete" };
        println!("{} ({})", status.model_id, state);
        for stage in &status.stages {
            let mark = if stage.present { "ok" } else { "--" };
            println!(
                "  [{}] {:<12} {}",
                mark,
                stage.stage.kind.to_string(),
                stage.stage.descriptor.path().display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("convkit").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_run_is_default_command() {
        let args = parse(&["--skip-setup"]);
        assert_eq!(args.command, None);
        assert!(args.skip_setup);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["status", "--json", "--work-dir", "/srv/convert"]);
        assert_eq!(args.command, Some(Command::Status));
        assert!(args.json);
        assert_eq!(args.work_dir, Some(PathBuf::from("/srv/convert")));
    }

    #[test]
    fn test_build_config_defaults() {
        let temp = TempDir::new().unwrap();
        let config = build_config(&parse(&[]), temp.path()).unwrap();
        assert_eq!(config.models_dir, temp.path().join("models"));
        assert_eq!(config.catalog.len(), 4);
        assert!(config.publish_dir.is_none());
    }

    #[test]
    fn test_build_config_overrides() {
        let temp = TempDir::new().unwrap();
        let catalog = temp.path().join("catalog.json");
        std::fs::write(&catalog, r#"{"models": [{"id": "custom"}]}"#).unwrap();
        let models = temp.path().join("weights");
        let public = temp.path().join("public");

        let args = parse(&[
            "--catalog",
            catalog.to_str().unwrap(),
            "--models-dir",
            models.to_str().unwrap(),
            "--publish-dir",
            public.to_str().unwrap(),
        ]);
        let config = build_config(&args, temp.path()).unwrap();

        assert_eq!(config.models_dir, models);
        assert_eq!(config.publish_dir, Some(public));
        assert!(config.catalog.get("custom").is_some());
        assert!(config.sweep.dirs.contains(&models));
    }

    #[test]
    fn test_status_without_models_dir() {
        let temp = TempDir::new().unwrap();
        let config = build_config(&parse(&["status"]), temp.path()).unwrap();
        let statuses = catalog_status(&ArtifactStore::new(&config.models_dir), &config.catalog);

        assert_eq!(statuses.len(), 4);
        assert!(statuses.iter().all(|s| !s.is_complete()));
        assert!(!config.models_dir.exists());
    }

    #[test]
    fn test_missing_catalog_is_error() {
        let temp = TempDir::new().unwrap();
        let args = parse(&["--catalog", "/nonexistent/catalog.json"]);
        assert!(build_config(&args, temp.path()).is_err());
    }
}
