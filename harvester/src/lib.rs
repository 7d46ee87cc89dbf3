pub mod app;
pub mod classify;
pub mod harvest;
pub mod interval;
pub mod ledger;
pub mod model;
pub mod oai;
pub mod sink;

pub use app::App;
pub use harvest::{Harvester, ShutdownSignal};
pub use interval::Interval;
pub use ledger::JobLedger;
pub use model::{HarvestBatch, HarvestJob, HarvestRecord, JobId, JobStatus};
