use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One `<record>` from an OAI-PMH `ListRecords` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestRecord {
    pub id: String,
    pub metadata_xml: String,
    pub date_stamp: String,
    pub deleted: bool,
}

/// The records of one page plus the token for the next page, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestBatch {
    pub records: Vec<HarvestRecord>,
    pub continuation_token: Option<String>,
    /// `completeListSize` as last reported by the source. Advisory only.
    pub total_hint: Option<u64>,
}

impl HarvestBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Collection,
    DeliverableUnit,
    Manifestation,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Collection => write!(f, "COLLECTION"),
            RecordType::DeliverableUnit => write!(f, "DELIVERABLE_UNIT"),
            RecordType::Manifestation => write!(f, "MANIFESTATION"),
        }
    }
}

/// Verdict of a record classifier for a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub accept: bool,
    pub origin: String,
    pub parent_id: Option<String>,
    pub record_type: RecordType,
    pub sink_id: String,
}

impl ClassificationResult {
    pub fn accepted(
        record: &HarvestRecord,
        origin: impl Into<String>,
        parent_id: Option<String>,
        record_type: RecordType,
    ) -> Self {
        let origin = origin.into();
        Self {
            sink_id: sink_id(&origin, &record.id),
            accept: true,
            origin,
            parent_id,
            record_type,
        }
    }

    pub fn dropped(record: &HarvestRecord, origin: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            accept: false,
            ..Self::accepted(record, origin, None, record_type)
        }
    }
}

/// Sink identity for a record: `origin:id`.
pub fn sink_id(origin: &str, record_id: &str) -> String {
    format!("{}:{}", origin, record_id)
}

/// Payload handed to the record sink for create-or-update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkRecord {
    pub id: String,
    pub origin: String,
    pub parent_id: Option<String>,
    pub record_type: RecordType,
    pub data: String,
    pub date_stamp: String,
}

impl SinkRecord {
    pub fn from_classified(record: &HarvestRecord, result: ClassificationResult) -> Self {
        Self {
            id: result.sink_id,
            origin: result.origin,
            parent_id: result.parent_id,
            record_type: result.record_type,
            data: record.metadata_xml.clone(),
            date_stamp: record.date_stamp.clone(),
        }
    }
}

/// Job identity: microseconds since the epoch at registration, kept strictly
/// increasing by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Running,
    Completed,
}

/// Run-time state of one harvest execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestJob {
    pub id: JobId,
    pub target: String,
    pub datasource: String,
    pub from: String,
    pub until: Option<String>,
    pub status: JobStatus,
    pub records_processed: u64,
    pub error: bool,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HarvestJob {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}
