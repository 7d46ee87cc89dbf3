pub mod client;
pub mod parse;
pub mod repair;

use crate::model::HarvestBatch;
use async_trait::async_trait;
use harvester_core::Result;

/// A paged source of harvest records.
#[async_trait]
pub trait RecordSource: Send {
    /// Fetch the next page. Must not be called once the source is exhausted.
    async fn next_batch(&mut self) -> Result<HarvestBatch>;

    /// True once a page arrived without a continuation token.
    fn is_exhausted(&self) -> bool;

    /// Get the source identifier
    fn source_id(&self) -> &str;
}

pub use client::OaiClient;
pub use repair::repair_namespaces;
