//! CLI entry point for the air quality ETL.
//!
//! Provides subcommands for flattening raw city documents into the staged
//! CSV, loading the staged rows into Supabase, analyzing the committed
//! table, and running all three in order.

mod infra;

use crate::infra::supabase::SupabaseClient;
use air_quality_etl::config::{Config, PublishConfig};
use air_quality_etl::pipeline::{run_all, run_analyze, run_load, run_transform};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "air_quality_etl")]
#[command(about = "Transform, load and analyze hourly city air quality data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten raw `<city>_raw_<suffix>.json` documents into the staged CSV
    Transform {
        /// Directory of raw documents (overrides RAW_DIR)
        #[arg(long, value_name = "DIR")]
        raw_dir: Option<PathBuf>,

        /// Staged CSV to write (overrides STAGED_CSV)
        #[arg(long, value_name = "FILE")]
        staged_csv: Option<PathBuf>,
    },
    /// Insert the staged CSV into the remote table in batches
    Load {
        /// Staged CSV to read (overrides STAGED_CSV)
        #[arg(long, value_name = "FILE")]
        staged_csv: Option<PathBuf>,

        #[command(flatten)]
        batching: BatchArgs,
    },
    /// Aggregate the remote table into summary reports
    Analyze {
        #[command(flatten)]
        reports: ReportArgs,
    },
    /// Run transform, load and analyze in order
    Run {
        #[command(flatten)]
        batching: BatchArgs,

        #[command(flatten)]
        reports: ReportArgs,
    },
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Rows per insert request (overrides BATCH_SIZE)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Retries per failed batch (overrides LOAD_MAX_RETRIES)
    #[arg(short = 'r', long)]
    max_retries: Option<u32>,
}

#[derive(clap::Args)]
struct ReportArgs {
    /// Directory for report files (overrides PROCESSED_DIR)
    #[arg(short = 'd', long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Optional: S3 bucket to upload reports to (overrides S3_BUCKET)
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Optional: Gzip compress reports before uploading to S3
    #[arg(long, default_value_t = false)]
    gzip: bool,
}

impl BatchArgs {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(batch_size) = self.batch_size {
            anyhow::ensure!(batch_size > 0, "--batch-size must be at least 1");
            config.retry.batch_size = batch_size;
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        Ok(())
    }
}

impl ReportArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.processed_dir = dir.clone();
        }
        if let Some(bucket) = &self.s3_bucket {
            let (prefix, gzip) = config
                .publish
                .as_ref()
                .map(|p| (p.prefix.clone(), p.gzip))
                .unwrap_or_else(|| ("air_quality".to_string(), false));
            config.publish = Some(PublishConfig {
                bucket: bucket.clone(),
                prefix,
                gzip,
            });
        }
        if self.gzip {
            match config.publish.as_mut() {
                Some(publish) => publish.gzip = true,
                None => warn!("--gzip has no effect without an S3 bucket"),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing()?;

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Transform {
            raw_dir,
            staged_csv,
        } => {
            if let Some(dir) = raw_dir {
                config.raw_dir = dir;
            }
            if let Some(path) = staged_csv {
                config.staged_csv = path;
            }
            let report = run_transform(&config)?;
            info!(
                rows = report.rows,
                documents = report.documents_read,
                skipped = report.skipped.len(),
                "Transformed data saved"
            );
        }
        Commands::Load {
            staged_csv,
            batching,
        } => {
            if let Some(path) = staged_csv {
                config.staged_csv = path;
            }
            batching.apply(&mut config)?;

            let client = SupabaseClient::new(config.require_store()?)?;
            let report = run_load(&config, &client).await?;
            info!(
                total_inserted = report.total_inserted,
                failed_batches = ?report.failed_batches,
                "Total inserted rows"
            );
        }
        Commands::Analyze { reports } => {
            reports.apply(&mut config);

            let client = SupabaseClient::new(config.require_store()?)?;
            let s3 = s3_client(&config).await;
            run_analyze(&config, &client, s3.as_ref()).await?;
        }
        Commands::Run { batching, reports } => {
            batching.apply(&mut config)?;
            reports.apply(&mut config);

            let client = SupabaseClient::new(config.require_store()?)?;
            let s3 = s3_client(&config).await;
            let report = run_all(&config, &client, s3.as_ref()).await?;

            if let Some(commit) = &report.commit {
                info!(
                    total_inserted = commit.total_inserted,
                    failed_batches = ?commit.failed_batches,
                    "ETL pipeline finished"
                );
            }
        }
    }

    Ok(())
}

/// Colored stderr output plus a JSON daily-rolling log file.
///
/// The returned guard must stay alive for the file writer to flush.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/air_quality_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("air_quality_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

async fn s3_client(config: &Config) -> Option<aws_sdk_s3::Client> {
    let publish = config.publish.as_ref()?;
    info!(bucket = %publish.bucket, gzip = publish.gzip, "S3 upload enabled");
    let sdk_config = aws_config::load_from_env().await;
    Some(aws_sdk_s3::Client::new(&sdk_config))
}
