use crate::interval::Interval;
use crate::model::{HarvestJob, JobId, JobStatus};
use chrono::Utc;
use harvester_core::{Error, Result, Target};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Process-wide registry of harvest jobs. At most one job per target name is
/// running at any time; finished jobs are kept newest first.
pub struct JobLedger {
    state: Mutex<LedgerState>,
    history_capacity: usize,
}

#[derive(Default)]
struct LedgerState {
    running: HashMap<String, HarvestJob>,
    completed: VecDeque<HarvestJob>,
    last_id: i64,
}

impl JobLedger {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            history_capacity: history_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a new job for `target`, or fail with `AlreadyRunning`.
    pub fn register(&self, target: &Target, interval: &Interval) -> Result<HarvestJob> {
        let mut state = self.lock();

        if let Some(existing) = state.running.get(&target.name) {
            return Err(Error::AlreadyRunning {
                target: target.name.clone(),
                job_id: existing.id.to_string(),
            });
        }

        let now = Utc::now();
        // Identities never repeat, even when two jobs start within the same microsecond
        let id = now.timestamp_micros().max(state.last_id + 1);
        state.last_id = id;

        let job = HarvestJob {
            id: JobId(id),
            target: target.name.clone(),
            datasource: target.datasource.clone(),
            from: interval.from().to_string(),
            until: interval.until().map(str::to_string),
            status: JobStatus::Running,
            records_processed: 0,
            error: false,
            error_message: None,
            started_at: now,
            completed_at: None,
        };
        state.running.insert(target.name.clone(), job.clone());

        info!(job_id = %job.id, target = %job.target, from = %job.from, until = ?job.until, "Registered harvest job");
        Ok(job)
    }

    /// Publish the running record count of a job.
    pub fn record_progress(&self, id: JobId, records_processed: u64) {
        let mut state = self.lock();
        if let Some(job) = state.running.values_mut().find(|job| job.id == id) {
            job.records_processed = records_processed;
        }
    }

    /// Freeze a running job and move it to the completed history.
    pub fn complete(&self, id: JobId, records_processed: u64, error: Option<String>) -> Result<HarvestJob> {
        let mut state = self.lock();

        let name = state
            .running
            .iter()
            .find(|(_, job)| job.id == id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| Error::Internal(format!("job {} is not running", id)))?;

        let mut job = state
            .running
            .remove(&name)
            .ok_or_else(|| Error::Internal(format!("job {} vanished from the ledger", id)))?;

        job.status = JobStatus::Completed;
        job.records_processed = records_processed;
        job.error = error.is_some();
        job.error_message = error;
        job.completed_at = Some(Utc::now());

        state.completed.push_front(job.clone());
        while state.completed.len() > self.history_capacity {
            if let Some(evicted) = state.completed.pop_back() {
                debug!(job_id = %evicted.id, "Evicted job from ledger history");
            }
        }

        info!(
            job_id = %job.id,
            target = %job.target,
            records = job.records_processed,
            error = job.error,
            "Completed harvest job"
        );
        Ok(job)
    }

    pub fn list_running(&self) -> Vec<HarvestJob> {
        let mut jobs: Vec<_> = self.lock().running.values().cloned().collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        jobs
    }

    pub fn list_completed(&self) -> Vec<HarvestJob> {
        self.lock().completed.iter().cloned().collect()
    }

    pub fn is_running(&self, target_name: &str) -> bool {
        self.lock().running.contains_key(target_name)
    }
}
