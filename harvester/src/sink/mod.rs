pub mod http;
pub mod memory;

use crate::model::SinkRecord;
use async_trait::async_trait;
use harvester_core::Result;

/// Downstream storage for harvested records. Calls are idempotent per sink id.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Create or update a record
    async fn upsert(&self, record: &SinkRecord) -> Result<()>;

    /// Mark a record as deleted
    async fn mark_deleted(&self, sink_id: &str) -> Result<()>;
}

pub use http::HttpSink;
pub use memory::{MemorySink, SinkCall};
