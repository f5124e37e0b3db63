//! cityleague-import CLI: drain the result queue, or feed it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use cityleague_import::config::{Config, DrainConfig};
use cityleague_import::db::Db;
use cityleague_import::engine::{Collaborators, Dispatcher, Producer, Worker, WorkerOptions};
use cityleague_import::queue::simplemq::SimpleMqClient;
use cityleague_import::store::s3::S3Store;
use cityleague_import::telemetry::{TelemetryConfig, init_telemetry};
use cityleague_import::upstream::{UpstreamClient, UpstreamUrls, http_client};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "cityleague-import", about = "Import City League results")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drain the queue once and exit
    Dequeue {
        /// TOML file with drain settings
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the maximum number of concurrent workers
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Publish official events onto the queue
    Enqueue {
        /// Event date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Keep running, enqueueing today's events at this interval
        #[arg(long)]
        every_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "cityleague-import".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let http = http_client(config.http_timeout)?;
    let queue = Arc::new(SimpleMqClient::new(
        http.clone(),
        config.mq_base_url.clone(),
        config.mq_name.clone(),
        config.mq_token.clone(),
    ));
    let upstream = Arc::new(UpstreamClient::new(
        http,
        UpstreamUrls {
            results: config.results_base_url.clone(),
            deck_images: config.deck_image_base_url.clone(),
            events: config.events_base_url.clone(),
        },
    ));

    match cli.command {
        Command::Dequeue {
            config: drain_path,
            concurrency,
        } => {
            let mut drain = match drain_path {
                Some(path) => DrainConfig::load(&path)?,
                None => DrainConfig::default(),
            };
            if let Some(n) = concurrency {
                anyhow::ensure!(n > 0, "--concurrency must be at least 1");
                drain.concurrency = n;
            }
            cmd_dequeue(&config, drain, queue, upstream).await
        }
        Command::Enqueue { date, every_secs } => {
            let producer = Producer::new(queue, upstream);
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                on_signal.cancel();
            });

            match every_secs {
                Some(secs) => {
                    producer
                        .run_periodically(Duration::from_secs(secs), cancel, || {
                            Local::now().date_naive()
                        })
                        .await?;
                }
                None => {
                    let date = date.unwrap_or_else(|| Local::now().date_naive());
                    let report = producer.enqueue_date(date, &cancel).await?;
                    println!("Enqueued {} of {} event(s) for {date}", report.sent, report.fetched);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_dequeue(
    config: &Config,
    drain: DrainConfig,
    queue: Arc<SimpleMqClient>,
    upstream: Arc<UpstreamClient>,
) -> anyhow::Result<ExitCode> {
    let db = Db::connect(
        config.database_url()?.expose_secret(),
        drain.db_max_connections,
    )
    .await?;
    db.migrate().await?;

    let store = S3Store::with_endpoint(
        config.s3_bucket.clone(),
        &config.s3_endpoint,
        config.s3_region.as_deref(),
    )
    .await;

    let worker = Worker::new(
        Collaborators {
            queue,
            results: upstream.clone(),
            deck_images: upstream,
            store: Arc::new(store),
            repository: Arc::new(db),
        },
        WorkerOptions {
            extend_visibility: drain.extend_visibility,
            discard_after: drain.discard_after(),
        },
    );

    let report = Dispatcher::new(worker, drain).run().await;
    info!(
        run_id = %report.run_id,
        received = report.received,
        dispatched = report.dispatched,
        failures = report.failures.len(),
        "dequeue complete"
    );

    Ok(ExitCode::SUCCESS)
}
