use clap::{Parser, Subcommand};
use harvester::sink::{MemorySink, RecordSink};
use harvester::{App, HarvestJob};
use harvester_core::backoff::RetryPolicy;
use harvester_core::{telemetry, Config, Error};
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[clap(name = "harvester")]
#[clap(about = "OAI-PMH harvester feeding the storage service", version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a single target
    Harvest {
        /// Configured target name
        #[clap(long)]
        target: String,

        /// Lower bound, YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ
        #[clap(long, env = "HARVEST_FROM")]
        from: String,

        /// Upper bound, same form as --from
        #[clap(long, env = "HARVEST_UNTIL")]
        until: Option<String>,

        /// Attempts in total; each retryable failure starts a fresh job.
        /// Defaults to `job_retry.max_attempts`
        #[clap(long)]
        retries: Option<u32>,

        /// Classify without writing to the storage service
        #[clap(long)]
        dry_run: bool,
    },

    /// Harvest every configured target concurrently
    HarvestAll {
        #[clap(long, env = "HARVEST_FROM")]
        from: String,

        #[clap(long, env = "HARVEST_UNTIL")]
        until: Option<String>,

        #[clap(long)]
        dry_run: bool,
    },

    /// List configured targets
    Targets,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Fatal error");
        process::exit(exit_code(&e));
    }
}

/// 2 for requests that can never succeed as given, 1 for everything else.
fn exit_code(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<Error>().is_some_and(Error::is_fatal) {
        2
    } else {
        1
    }
}

fn retry_policy(config: &Config, attempts: Option<u32>) -> RetryPolicy {
    let policy = RetryPolicy::from(&config.job_retry);
    match attempts {
        Some(n) => RetryPolicy::new(n, policy.base_delay_ms),
        None => policy,
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    telemetry::init(&config.telemetry)?;

    let cli = Cli::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            let _ = shutdown_tx.send(true);
        }
    });

    match cli.command {
        Commands::Harvest { target, from, until, retries, dry_run } => {
            let policy = retry_policy(&config, retries);
            let (app, dry) = build_app(config, dry_run)?;
            info!(
                target = %target,
                from = %from,
                until = ?until,
                attempts = policy.max_attempts,
                dry_run,
                "Starting harvest"
            );

            let result = app
                .harvest_with_retry(&target, Some(&from), until.as_deref(), policy, &shutdown_rx)
                .await;

            print_jobs(&app.ledger().list_completed())?;
            report_dry_run(dry.as_deref());
            result?;
        }

        Commands::HarvestAll { from, until, dry_run } => {
            let (app, dry) = build_app(config, dry_run)?;
            info!(targets = app.targets().len(), from = %from, until = ?until, dry_run, "Starting harvest of all targets");

            let results = app.harvest_all(Some(&from), until.as_deref(), &shutdown_rx).await;

            print_jobs(&app.ledger().list_completed())?;
            report_dry_run(dry.as_deref());

            let failed: Vec<_> = results
                .iter()
                .filter_map(|(name, result)| result.as_ref().err().map(|e| (name, e)))
                .collect();
            for (name, e) in &failed {
                error!(target = %name, error = %e, "Harvest failed");
            }
            if !failed.is_empty() {
                anyhow::bail!("{} of {} harvests failed", failed.len(), results.len());
            }
        }

        Commands::Targets => {
            for target in &config.targets {
                println!(
                    "{}\t{}\t{:?}\t{}",
                    target.name, target.datasource, target.filter, target.base_url
                );
            }
        }
    }

    Ok(())
}

fn build_app(config: Config, dry_run: bool) -> anyhow::Result<(App, Option<Arc<MemorySink>>)> {
    if dry_run {
        let sink = Arc::new(MemorySink::new());
        let app = App::new(config, Arc::clone(&sink) as Arc<dyn RecordSink>);
        Ok((app, Some(sink)))
    } else {
        Ok((App::with_http_sink(config)?, None))
    }
}

fn print_jobs(jobs: &[HarvestJob]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(jobs)?);
    Ok(())
}

fn report_dry_run(sink: Option<&MemorySink>) {
    if let Some(sink) = sink {
        info!(upserts = sink.upserts(), deletes = sink.deletes(), "Dry run finished, nothing written");
    }
}
