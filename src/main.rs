use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use card_reconciler::{run, LocalDirSource, ReconcileError, ReconcilerConfig};

#[derive(Parser)]
#[command(name = "card-reconciler", version, about = "Reconcile organizations' card reports against the loyalty card export")]
struct Cli {
    /// JSON file replacing the built-in organization tables and paths
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the staged external files (default)
    Run(RunArgs),

    /// Download external files into the staging directory
    Fetch,

    /// Print the effective configuration as JSON
    ShowConfig,
}

#[derive(Args, Default)]
struct RunArgs {
    #[arg(long)]
    origin: Option<PathBuf>,

    #[arg(long)]
    external_dir: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Download external files before reconciling
    #[arg(long)]
    fetch: bool,

    /// Skip (and report) malformed external rows instead of aborting
    #[arg(long)]
    skip_malformed: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = try_main() {
        match err.downcast_ref::<ReconcileError>() {
            Some(cause) if cause.is_parse() => {
                tracing::error!(row = cause.raw_row().unwrap_or(""), "failed to parse source file: {:#}", err);
                eprintln!("❌ Failed to parse source file: {}", cause);
            }
            _ => {
                tracing::error!("run failed: {:#}", err);
                eprintln!("❌ {:#}", err);
            }
        }
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReconcilerConfig::from_file(path)?,
        None => ReconcilerConfig::default(),
    };

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => {
            if let Some(origin) = args.origin {
                config.origin_path = origin;
            }
            if let Some(dir) = args.external_dir {
                config.external_dir = dir;
            }
            if let Some(dir) = args.output_dir {
                config.output_dir = dir;
            }
            config.skip_malformed_rows |= args.skip_malformed;

            if args.fetch {
                fetch(&config)?;
            }
            run_reconciliation(&config)
        }
        Command::Fetch => fetch(&config),
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run_reconciliation(config: &ReconcilerConfig) -> Result<()> {
    println!("📂 Origin: {}", config.origin_path.display());
    println!("📥 External: {}", config.external_dir.display());

    let source = LocalDirSource::new(&config.external_dir);
    let summary = run(config, &source)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {} origin records indexed", summary.origin_records);
    if summary.index.collisions > 0 || summary.index.shadowed > 0 {
        println!(
            "⚠️  {} duplicate card numbers (later record kept), {} shadowed by a live card",
            summary.index.collisions, summary.index.shadowed
        );
    }
    println!("✓ {}", summary.report.summary());
    for skipped in &summary.report.skipped {
        println!("⚠️  skipped {}:{} - {}", skipped.file, skipped.line, skipped.reason);
    }
    for path in &summary.written {
        println!("💾 {}", path.display());
    }

    Ok(())
}

#[cfg(feature = "sftp")]
fn fetch(config: &ReconcilerConfig) -> Result<()> {
    let files = card_reconciler::remote::fetch_external(&config.remote, &config.external_dir)?;
    println!("✓ Downloaded {} files into {}", files.len(), config.external_dir.display());
    Ok(())
}

#[cfg(not(feature = "sftp"))]
fn fetch(_config: &ReconcilerConfig) -> Result<()> {
    anyhow::bail!("remote fetch not available, rebuild with: cargo build --features sftp")
}
