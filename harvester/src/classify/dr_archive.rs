use super::preservation7::{is_information_object, Preservation7Classifier};
use super::{count_drop, FilterStats, RecordClassifier};
use crate::model::{ClassificationResult, HarvestRecord, RecordType};
use once_cell::sync::Lazy;
use regex::Regex;

static PUBLISHER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:[\w-]+:)?publisher>\s*([^<]*?)\s*</(?:[\w-]+:)?publisher>").expect("valid regex")
});

/// Preservica 7 records restricted to material published by DR.
pub struct DrArchiveClassifier {
    inner: Preservation7Classifier,
}

impl DrArchiveClassifier {
    pub fn new(datasource: impl Into<String>) -> Self {
        Self {
            inner: Preservation7Classifier::new(datasource),
        }
    }
}

fn published_by_dr(metadata: &str) -> bool {
    PUBLISHER
        .captures(metadata)
        .and_then(|c| c.get(1))
        .is_some_and(|publisher| {
            publisher
                .as_str()
                .get(..2)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("dr"))
        })
}

impl RecordClassifier for DrArchiveClassifier {
    fn classify(&mut self, record: &HarvestRecord) -> ClassificationResult {
        if is_information_object(&record.id) && !published_by_dr(&record.metadata_xml) {
            count_drop(
                &mut self.inner.stats_mut().publisher_mismatch,
                "publisher is not DR",
                &record.id,
            );
            return ClassificationResult::dropped(record, self.inner.datasource(), RecordType::DeliverableUnit);
        }

        self.inner.classify(record)
    }

    fn stats(&self) -> FilterStats {
        self.inner.stats()
    }

    fn name(&self) -> &'static str {
        "dr_archive"
    }
}
