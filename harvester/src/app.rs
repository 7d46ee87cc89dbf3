use crate::harvest::{Harvester, ShutdownSignal};
use crate::ledger::JobLedger;
use crate::model::HarvestJob;
use crate::sink::{HttpSink, RecordSink};
use harvester_core::backoff::{retry_with_backoff, RetryPolicy};
use futures::future::join_all;
use harvester_core::{Config, Error, Result, Target};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct App {
    config: Config,
    harvester: Arc<Harvester>,
}

impl App {
    pub fn new(config: Config, sink: Arc<dyn RecordSink>) -> Self {
        let ledger = Arc::new(JobLedger::new(config.ledger.history_capacity));
        let harvester = Arc::new(Harvester::new(ledger, sink, config.http.clone()));
        Self { config, harvester }
    }

    /// Wire the application against the storage service configured in `sink`.
    #[instrument(skip(config))]
    pub fn with_http_sink(config: Config) -> Result<Self> {
        info!(sink = %config.sink.base_url, targets = config.targets.len(), "Initializing application");
        let sink = Arc::new(HttpSink::new(&config.sink)?);
        Ok(Self::new(config, sink))
    }

    pub fn targets(&self) -> &[Target] {
        &self.config.targets
    }

    pub fn ledger(&self) -> &Arc<JobLedger> {
        self.harvester.ledger()
    }

    fn target(&self, name: &str) -> Result<&Target> {
        self.config
            .target(name)
            .ok_or_else(|| Error::UnknownTarget(name.to_string()))
    }

    pub async fn harvest(
        &self,
        name: &str,
        from: Option<&str>,
        until: Option<&str>,
        shutdown: &ShutdownSignal,
    ) -> Result<HarvestJob> {
        let target = self.target(name)?;
        self.harvester.harvest(target, from, until, shutdown).await
    }

    /// Re-run a failed harvest as a fresh job while the failure is retryable.
    pub async fn harvest_with_retry(
        &self,
        name: &str,
        from: Option<&str>,
        until: Option<&str>,
        policy: RetryPolicy,
        shutdown: &ShutdownSignal,
    ) -> Result<HarvestJob> {
        retry_with_backoff(
            || self.harvest(name, from, until, shutdown),
            policy,
            "harvest",
        )
        .await
    }

    /// Harvest every configured target concurrently, one task per target.
    pub async fn harvest_all(
        &self,
        from: Option<&str>,
        until: Option<&str>,
        shutdown: &ShutdownSignal,
    ) -> Vec<(String, Result<HarvestJob>)> {
        let spawned: Vec<_> = self
            .config
            .targets
            .iter()
            .map(|target| {
                let harvester = Arc::clone(&self.harvester);
                let target = target.clone();
                let from = from.map(str::to_string);
                let until = until.map(str::to_string);
                let shutdown = shutdown.clone();
                let name = target.name.clone();
                let handle = tokio::spawn(async move {
                    harvester
                        .harvest(&target, from.as_deref(), until.as_deref(), &shutdown)
                        .await
                });
                (name, handle)
            })
            .collect();

        let (names, handles): (Vec<_>, Vec<_>) = spawned.into_iter().unzip();
        names
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(name, joined)| {
                let result = joined
                    .map_err(|e| Error::Internal(format!("harvest task for '{}' panicked: {}", name, e)))
                    .and_then(|r| r);
                (name, result)
            })
            .collect()
    }
}
