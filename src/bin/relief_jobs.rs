use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relief_map_jobs::config::JobConfig;
use relief_map_jobs::geocode::{GeocodeHttpClient, GeocodeResolver};
use relief_map_jobs::pipeline::{Pipeline, PipelineSettings};
use relief_map_jobs::sheet::SheetHttpClient;
use relief_map_jobs::storage::{Publisher, R2Client};

#[derive(Parser)]
#[command(name = "relief-jobs")]
#[command(about = "Publishes the relief spreadsheet as JSON datasets for the map dashboard")]
#[command(version)]
struct Cli {
    /// Job to run. Only `create-json` is known.
    #[arg(long, env = "JOB_NAME")]
    job: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    CreateJson,
}

impl Job {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "create-json" => Some(Job::CreateJson),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    finish(run())
}

/// Failures are reported on stderr; the job itself always exits successfully.
fn finish(result: miette::Result<()>) -> ExitCode {
    if let Err(report) = result {
        eprintln!("{report:?}");
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(name) = cli.job else {
        info!("no job selected");
        return Ok(());
    };
    match Job::from_name(&name) {
        Some(Job::CreateJson) => run_create_json(),
        None => {
            warn!(job = %name, "unknown job, nothing to do");
            Ok(())
        }
    }
}

fn run_create_json() -> miette::Result<()> {
    let config = JobConfig::from_env()?;
    info!(config = ?config, "starting create-json");

    let sheets = SheetHttpClient::new(&config.document_id)?;
    let resolver = GeocodeResolver::new(
        GeocodeHttpClient::new(&config.geocode_api_key)?,
        config.static_overrides()?,
    );
    let publisher = Publisher::new(R2Client::new(config.storage.clone())?);
    let settings = PipelineSettings {
        tabs: config.tabs.clone(),
        info_schema: config.info_schema,
        prefecture: config.prefecture.clone(),
    };

    let mut pipeline = Pipeline::new(sheets, resolver, publisher, settings);
    let summary = pipeline.run()?;
    if !summary.failed().is_empty() {
        warn!(failed = ?summary.failed(), "some datasets were not published");
    }
    Ok(())
}
