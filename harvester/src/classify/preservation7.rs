use super::{count_drop, media_origin, FilterStats, RecordClassifier};
use crate::model::{ClassificationResult, HarvestRecord, RecordType};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static MOVING_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:[\w-]+:)?formatMediaType>\s*Moving Image\s*</(?:[\w-]+:)?formatMediaType>")
        .expect("valid regex")
});
static SOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:[\w-]+:)?formatMediaType>\s*Sound\s*</(?:[\w-]+:)?formatMediaType>")
        .expect("valid regex")
});
static PBCORE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"schemaUri=["']http://www\.pbcore\.org/PBCore/PBCoreNamespace\.html["']"#)
        .expect("valid regex")
});
static TRANSCODING_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:[\w-]+:)?transcodingStatus>([^<]*)</(?:[\w-]+:)?transcodingStatus>")
        .expect("valid regex")
});

const STRUCTURAL_OBJECT: &str = "oai:so";
const INFORMATION_OBJECT: &str = "oai:io";

/// Preservica 7 records. Structural folders are never kept; information
/// objects need a PBCore block and a finished transcoding.
pub struct Preservation7Classifier {
    datasource: String,
    stats: FilterStats,
}

impl Preservation7Classifier {
    pub fn new(datasource: impl Into<String>) -> Self {
        Self {
            datasource: datasource.into(),
            stats: FilterStats::default(),
        }
    }

    pub(super) fn stats_mut(&mut self) -> &mut FilterStats {
        &mut self.stats
    }

    pub(super) fn datasource(&self) -> &str {
        &self.datasource
    }

    fn origin(&mut self, record: &HarvestRecord) -> String {
        match media_origin(&record.metadata_xml, &MOVING_IMAGE, &SOUND) {
            Some(origin) => origin.to_string(),
            None => {
                self.stats.unknown_origin += 1;
                warn!(
                    record = %record.id,
                    datasource = %self.datasource,
                    "No media type marker found, falling back to datasource origin"
                );
                self.datasource.clone()
            }
        }
    }
}

pub(super) fn is_information_object(id: &str) -> bool {
    id.contains(INFORMATION_OBJECT)
}

/// Everything that survives filtering is filed as a unit, information objects included.
fn record_type(_id: &str) -> RecordType {
    RecordType::DeliverableUnit
}

fn transcoding_done(metadata: &str) -> bool {
    TRANSCODING_STATUS
        .captures(metadata)
        .and_then(|c| c.get(1))
        .is_some_and(|status| status.as_str() == "done")
}

impl RecordClassifier for Preservation7Classifier {
    fn classify(&mut self, record: &HarvestRecord) -> ClassificationResult {
        let record_type = record_type(&record.id);

        if record.id.contains(STRUCTURAL_OBJECT) {
            self.stats.structural_folders += 1;
            debug!(record = %record.id, "Dropping structural folder");
            return ClassificationResult::dropped(record, &self.datasource, record_type);
        }

        if is_information_object(&record.id) {
            if !PBCORE_BLOCK.is_match(&record.metadata_xml) {
                count_drop(&mut self.stats.empty_metadata, "information object without PBCore metadata", &record.id);
                return ClassificationResult::dropped(record, &self.datasource, record_type);
            }

            if !transcoding_done(&record.metadata_xml) {
                count_drop(&mut self.stats.transcoding_pending, "transcoding not done", &record.id);
                return ClassificationResult::dropped(record, &self.datasource, record_type);
            }
        }

        let origin = self.origin(record);
        ClassificationResult::accepted(record, origin, None, record_type)
    }

    fn stats(&self) -> FilterStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "preservation7"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classify::{ORIGIN_RADIO, ORIGIN_TV};

    pub(crate) fn record(id: &str, metadata: &str) -> HarvestRecord {
        HarvestRecord {
            id: id.into(),
            metadata_xml: metadata.into(),
            date_stamp: "2023-01-05T10:00:00Z".into(),
            deleted: false,
        }
    }

    /// Information object body with a PBCore block, media type and transcoding status.
    pub(crate) fn io_metadata(publisher: &str, media: &str, transcoding: &str) -> String {
        format!(
            r#"<xip:XIP xmlns:xip="http://preservica.com/XIP/v7.0">
  <xip:Metadata schemaUri="http://www.pbcore.org/PBCore/PBCoreNamespace.html">
    <pbc:PBCoreDescriptionDocument xmlns:pbc="http://www.pbcore.org/PBCore/PBCoreNamespace.html">
      <pbc:pbcorePublisher><pbc:publisher>{publisher}</pbc:publisher></pbc:pbcorePublisher>
      <pbc:pbcoreInstantiation><pbc:formatMediaType>{media}</pbc:formatMediaType></pbc:pbcoreInstantiation>
    </pbc:PBCoreDescriptionDocument>
  </xip:Metadata>
  <xip:Metadata schemaUri="http://id.kb.dk/schemas/supplementary_tv_metadata">
    <access:transcodingStatus xmlns:access="http://id.kb.dk/schemas/access">{transcoding}</access:transcodingStatus>
  </xip:Metadata>
</xip:XIP>"#
        )
    }

    #[test]
    fn structural_folders_are_always_dropped() {
        let mut c = Preservation7Classifier::new("ds.preservica");
        let full = io_metadata("DR P1", "Sound", "done");
        let result = c.classify(&record("oai:so:1a2b", &full));
        assert!(!result.accept);
        assert_eq!(c.stats().structural_folders, 1);
        assert_eq!(c.stats().empty_metadata, 0);
    }

    #[test]
    fn information_object_without_pbcore_counts_as_empty_metadata() {
        let mut c = Preservation7Classifier::new("ds.preservica");
        let result = c.classify(&record(
            "oai:io:42",
            "<xip:XIP><access:transcodingStatus>done</access:transcodingStatus></xip:XIP>",
        ));
        assert!(!result.accept);
        assert_eq!(c.stats().empty_metadata, 1);
        assert_eq!(c.stats().transcoding_pending, 0);
    }

    #[test]
    fn unfinished_transcoding_is_dropped_without_touching_empty_metadata() {
        let mut c = Preservation7Classifier::new("ds.preservica");
        for status in ["pending", "Done", " done"] {
            let result = c.classify(&record("oai:io:43", &io_metadata("DR P1", "Sound", status)));
            assert!(!result.accept, "status {status:?} should be dropped");
        }
        assert_eq!(c.stats().empty_metadata, 0);
        assert_eq!(c.stats().transcoding_pending, 3);
    }

    #[test]
    fn missing_transcoding_block_is_dropped() {
        let mut c = Preservation7Classifier::new("ds.preservica");
        let metadata = r#"<Metadata schemaUri="http://www.pbcore.org/PBCore/PBCoreNamespace.html"/>"#;
        assert!(!c.classify(&record("oai:io:44", metadata)).accept);
        assert_eq!(c.stats().transcoding_pending, 1);
    }

    #[test]
    fn finished_information_objects_are_filed_by_media_type() {
        let mut c = Preservation7Classifier::new("ds.preservica");

        let radio = c.classify(&record("oai:io:50", &io_metadata("DR P1", "Sound", "done")));
        assert!(radio.accept);
        assert_eq!(radio.origin, ORIGIN_RADIO);
        assert_eq!(radio.sink_id, "ds.radio:oai:io:50");
        assert_eq!(radio.record_type, RecordType::DeliverableUnit);
        assert_eq!(radio.parent_id, None);

        let tv = c.classify(&record("oai:io:51", &io_metadata("DR1", "Moving Image", "done")));
        assert_eq!(tv.origin, ORIGIN_TV);
        assert_eq!(c.stats().total_dropped(), 0);
    }

    #[test]
    fn other_objects_skip_the_information_object_checks() {
        let mut c = Preservation7Classifier::new("ds.preservica");
        let result = c.classify(&record("oai:co:9", "<xip:ContentObject/>"));
        assert!(result.accept);
        assert_eq!(result.origin, "ds.preservica");
    }

    #[test]
    fn counters_are_scoped_to_the_instance() {
        let mut first = Preservation7Classifier::new("ds.preservica");
        first.classify(&record("oai:io:1", ""));
        let second = Preservation7Classifier::new("ds.preservica");
        assert_eq!(first.stats().empty_metadata, 1);
        assert_eq!(second.stats().empty_metadata, 0);
    }
}
