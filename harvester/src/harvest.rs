use crate::classify::{self, RecordClassifier};
use crate::interval::Interval;
use crate::ledger::JobLedger;
use crate::model::{sink_id, HarvestBatch, HarvestJob, HarvestRecord, SinkRecord};
use crate::oai::{OaiClient, RecordSource};
use crate::sink::RecordSink;
use harvester_core::config::HttpConfig;
use harvester_core::telemetry::{JOBS_COMPLETED, RECORDS_DELETED, RECORDS_DROPPED, RECORDS_FORWARDED};
use harvester_core::{Error, Result, Target};
use metrics::counter;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// Flipped to `true` when the process is shutting down. Checked between batches.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Runs harvest jobs: pages through a source, classifies every record and
/// forwards the accepted ones to the sink, with the ledger tracking admission
/// and outcome.
pub struct Harvester {
    ledger: Arc<JobLedger>,
    sink: Arc<dyn RecordSink>,
    http: HttpConfig,
}

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    batches: u64,
    processed: u64,
    forwarded: u64,
    deleted: u64,
    dropped: u64,
}

impl Harvester {
    pub fn new(ledger: Arc<JobLedger>, sink: Arc<dyn RecordSink>, http: HttpConfig) -> Self {
        Self { ledger, sink, http }
    }

    pub fn ledger(&self) -> &Arc<JobLedger> {
        &self.ledger
    }

    /// Harvest `target` over `from`/`until` from its OAI-PMH endpoint.
    #[instrument(skip(self, target, shutdown), fields(target = %target.name))]
    pub async fn harvest(
        &self,
        target: &Target,
        from: Option<&str>,
        until: Option<&str>,
        shutdown: &ShutdownSignal,
    ) -> Result<HarvestJob> {
        let interval = Interval::validate(from, until)?.for_granularity(target.granularity);
        let source = OaiClient::new(target.clone(), interval.clone(), &self.http)?;
        self.run(target, &interval, source, shutdown).await
    }

    /// Run one job against an already constructed source. The job is always
    /// completed in the ledger before this returns, whatever the outcome.
    pub async fn run<S: RecordSource>(
        &self,
        target: &Target,
        interval: &Interval,
        mut source: S,
        shutdown: &ShutdownSignal,
    ) -> Result<HarvestJob> {
        let job = self.ledger.register(target, interval)?;
        let mut classifier = classify::for_target(target);
        let mut progress = Progress::default();
        let started = Instant::now();

        let outcome = self
            .harvest_loop(&job, target, &mut source, classifier.as_mut(), &mut progress, shutdown)
            .await;

        let stats = classifier.stats();
        info!(
            job_id = %job.id,
            classifier = classifier.name(),
            structural_folders = stats.structural_folders,
            empty_metadata = stats.empty_metadata,
            transcoding_pending = stats.transcoding_pending,
            publisher_mismatch = stats.publisher_mismatch,
            missing_parent = stats.missing_parent,
            unknown_origin = stats.unknown_origin,
            "Classifier statistics"
        );

        match outcome {
            Ok(()) => {
                let done = self.ledger.complete(job.id, progress.processed, None)?;
                counter!(JOBS_COMPLETED, "outcome" => "success").increment(1);
                info!(
                    "✅ Harvest of {} finished: {} records in {} batches ({} forwarded, {} deleted, {} dropped) in {:.1}s",
                    target.name,
                    progress.processed,
                    progress.batches,
                    progress.forwarded,
                    progress.deleted,
                    progress.dropped,
                    started.elapsed().as_secs_f64()
                );
                Ok(done)
            }
            Err(e) => {
                counter!(JOBS_COMPLETED, "outcome" => "error").increment(1);
                error!(
                    job_id = %job.id,
                    records = progress.processed,
                    error = %e,
                    "❌ Harvest of {} failed",
                    target.name
                );
                if let Err(ledger_err) = self.ledger.complete(job.id, progress.processed, Some(e.to_string())) {
                    error!(job_id = %job.id, error = %ledger_err, "Failed to complete job in ledger");
                }
                Err(e)
            }
        }
    }

    async fn harvest_loop<S: RecordSource>(
        &self,
        job: &HarvestJob,
        target: &Target,
        source: &mut S,
        classifier: &mut dyn RecordClassifier,
        progress: &mut Progress,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        let mut batch = next_batch(source, shutdown).await?;

        loop {
            if batch.is_empty() {
                if !source.is_exhausted() {
                    warn!(
                        job_id = %job.id,
                        "Source returned an empty page with a resumption token, stopping"
                    );
                }
                break;
            }

            progress.batches += 1;
            for record in &batch.records {
                self.forward(target, record, classifier, progress).await?;
            }

            self.ledger.record_progress(job.id, progress.processed);
            log_progress(target, &batch, progress);

            if source.is_exhausted() {
                break;
            }
            batch = next_batch(source, shutdown).await?;
        }

        Ok(())
    }

    async fn forward(
        &self,
        target: &Target,
        record: &HarvestRecord,
        classifier: &mut dyn RecordClassifier,
        progress: &mut Progress,
    ) -> Result<()> {
        if record.deleted {
            // Tombstones carry no metadata to classify; they are filed under the datasource
            let id = sink_id(&target.datasource, &record.id);
            self.sink.mark_deleted(&id).await?;
            progress.deleted += 1;
            counter!(RECORDS_DELETED, "target" => target.name.clone()).increment(1);
        } else {
            let result = classifier.classify(record);
            if result.accept {
                self.sink.upsert(&SinkRecord::from_classified(record, result)).await?;
                progress.forwarded += 1;
                counter!(RECORDS_FORWARDED, "target" => target.name.clone()).increment(1);
            } else {
                progress.dropped += 1;
                counter!(RECORDS_DROPPED, "target" => target.name.clone()).increment(1);
            }
        }

        progress.processed += 1;
        Ok(())
    }
}

async fn next_batch<S: RecordSource>(source: &mut S, shutdown: &ShutdownSignal) -> Result<HarvestBatch> {
    let cancelled = *shutdown.borrow();
    if cancelled {
        warn!(source = source.source_id(), "Shutdown requested, not fetching further pages");
        return Err(Error::Cancelled);
    }
    source.next_batch().await
}

fn log_progress(target: &Target, batch: &HarvestBatch, progress: &Progress) {
    match batch.total_hint.filter(|total| *total > 0) {
        Some(total) => info!(
            "📥 {} | Batch #{} with {} records | Processed: {} / ~{} ({:.1}%)",
            target.name,
            progress.batches,
            batch.len(),
            progress.processed,
            total,
            (progress.processed as f64 / total as f64 * 100.0).min(100.0)
        ),
        None => info!(
            "📥 {} | Batch #{} with {} records | Processed: {}",
            target.name,
            progress.batches,
            batch.len(),
            progress.processed
        ),
    }
}
