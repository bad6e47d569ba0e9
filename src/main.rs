use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabular_ingest::runner::{RunOptions, RunSummary, run};
use tabular_ingest::settings::Settings;

#[derive(Parser, Clone)]
#[command(version, about = "Download tabular files listed in a manifest and load them into PostgreSQL")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Process every entry of the manifest named in the settings file
    Load {
        /// Path to the YAML settings file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Directory downloads are written to (and deleted from)
        #[arg(short, long, default_value = ".")]
        work_dir: PathBuf,

        /// Show what would be loaded without downloading or connecting
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - warnings only, no progress bars
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Load {
            config,
            work_dir,
            dry_run,
            quiet,
        } => {
            init_tracing(quiet);

            let settings = Settings::load(&config)?;

            if !quiet {
                println!("Tabular Ingest");
                println!("==============");
                println!("Settings: {}", config.display());
                println!("Manifest: {}", settings.source_file.display());
                println!("Database: {}", settings.postgres.display_url());
                println!("Batch size: {}", settings.batch_size);
                println!();
            }

            let options = RunOptions {
                work_dir,
                dry_run,
                quiet,
            };

            let summary = run(&settings, options).await?;

            if dry_run {
                print_plan(&summary);
            } else {
                print_summary(&summary);
            }
        }
    }
    Ok(())
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let default_filter = if quiet {
        "tabular_ingest=warn,sqlx=off"
    } else {
        "tabular_ingest=info,sqlx=off"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_plan(summary: &RunSummary) {
    println!("DRY RUN MODE - No data will be loaded");
    println!();
    for (idx, plan) in summary.planned.iter().enumerate() {
        println!("{}. {}", idx + 1, plan.url);
        println!("   File:   {}", plan.local_path.display());
        println!("   Format: {}", plan.format);
        println!("   Table:  {}", plan.table);
    }
    println!();
    println!("To execute, run without --dry-run");
}

fn print_summary(summary: &RunSummary) {
    let secs = summary.duration.as_secs_f64();

    println!();
    println!("Load Summary");
    println!("============");
    println!("Manifest entries: {}", summary.entries);
    println!(
        "Files loaded: {} (downloaded: {}, skipped: {})",
        summary.files_loaded, summary.files_downloaded, summary.files_skipped
    );
    println!("Bytes downloaded: {}", summary.bytes_downloaded);
    println!("Records loaded: {}", summary.records_loaded);
    println!("Batches: {}", summary.batches);
    println!("Duration: {:.2}s", secs);
    if secs > 0.0 {
        println!(
            "Throughput: {:.2} records/sec",
            summary.records_loaded as f64 / secs
        );
    }
    if let (Some(p50), Some(p90), Some(p99)) = summary.batch_latency_ms {
        println!("Batch latency: p50={}ms p90={}ms p99={}ms", p50, p90, p99);
    }
}
