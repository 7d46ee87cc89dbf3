use super::RecordSink;
use crate::model::SinkRecord;
use async_trait::async_trait;
use harvester_core::Result;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Upsert(SinkRecord),
    Delete(String),
}

/// Keeps every call in order. Used for dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    calls: Mutex<Vec<SinkCall>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn upserts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SinkCall::Upsert(_)))
            .count()
    }

    pub fn deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SinkCall::Delete(_)))
            .count()
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn upsert(&self, record: &SinkRecord) -> Result<()> {
        self.push(SinkCall::Upsert(record.clone()));
        Ok(())
    }

    async fn mark_deleted(&self, sink_id: &str) -> Result<()> {
        self.push(SinkCall::Delete(sink_id.to_string()));
        Ok(())
    }
}
