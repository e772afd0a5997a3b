use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tarifas::pipeline::{ExtractOptions, ValidateOptions, extract_sources, validate_configs};
use tarifas::verify::{DEFAULT_THRESHOLD_PERCENT, VerifyOptions, run_verify};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tarifas",
    about = "Config-driven utility tariff extractor for Colombian providers"
)]
struct Cli {
    #[arg(long, default_value = "configs/sources")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Extract {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    Validate {
        #[arg(long)]
        source_file: Option<PathBuf>,
    },
    Verify {
        #[arg(long)]
        baseline_dir: PathBuf,
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_PERCENT)]
        threshold: f64,
    },
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { source, out_dir } => {
            let single = source.is_some();
            let results = extract_sources(&ExtractOptions {
                config_dir: cli.config_dir,
                source,
                out_dir,
            })?;

            let failed = results.iter().filter(|r| !r.is_success()).count();
            info!(sources = results.len(), failed, "extraction complete");

            if single && let Some(result) = results.first() {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
        }
        Commands::Validate { source_file } => {
            let messages = validate_configs(&ValidateOptions {
                config_dir: Some(cli.config_dir),
                source_file,
            })?;
            for line in messages {
                println!("{line}");
            }
        }
        Commands::Verify {
            baseline_dir,
            source,
            threshold,
        } => {
            let report = run_verify(&VerifyOptions {
                config_dir: cli.config_dir,
                baseline_dir,
                source,
                threshold_percent: threshold,
            })?;
            info!(
                sources = report.sources_checked,
                differences = report.differences.len(),
                errors = report.errors.len(),
                clean = report.is_clean(),
                "verification complete"
            );

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
