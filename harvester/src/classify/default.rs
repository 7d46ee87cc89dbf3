use super::{FilterStats, RecordClassifier};
use crate::model::{ClassificationResult, HarvestRecord, RecordType};

/// Files every record under the target's datasource as a unit.
pub struct DefaultClassifier {
    datasource: String,
}

impl DefaultClassifier {
    pub fn new(datasource: impl Into<String>) -> Self {
        Self {
            datasource: datasource.into(),
        }
    }
}

impl RecordClassifier for DefaultClassifier {
    fn classify(&mut self, record: &HarvestRecord) -> ClassificationResult {
        ClassificationResult::accepted(record, &self.datasource, None, RecordType::DeliverableUnit)
    }

    fn stats(&self) -> FilterStats {
        FilterStats::default()
    }

    fn name(&self) -> &'static str {
        "default"
    }
}
