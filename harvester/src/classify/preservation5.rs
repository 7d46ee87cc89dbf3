use super::{count_drop, media_origin, FilterStats, RecordClassifier};
use crate::model::{ClassificationResult, HarvestRecord, RecordType};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static MOVING_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<formatMediaType>\s*Moving Image\s*</formatMediaType>").expect("valid regex")
});
static SOUND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<formatMediaType>\s*Sound\s*</formatMediaType>").expect("valid regex"));
static MANIFESTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:[\w-]+:)?Manifestation[\s>]").expect("valid regex"));
static DELIVERABLE_UNIT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"<(?:[\w-]+:)?DeliverableUnitRef>\s*([A-Za-z0-9-]{30,40})\s*</(?:[\w-]+:)?DeliverableUnitRef>",
    )
    .expect("valid regex")
});

/// Preservica 5 XIP records: collections, deliverable units and manifestations.
pub struct Preservation5Classifier {
    datasource: String,
    stats: FilterStats,
}

impl Preservation5Classifier {
    pub fn new(datasource: impl Into<String>) -> Self {
        Self {
            datasource: datasource.into(),
            stats: FilterStats::default(),
        }
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

fn record_type(id: &str) -> RecordType {
    if id.contains("oai:col") {
        RecordType::Collection
    } else if id.contains("oai:man") {
        RecordType::Manifestation
    } else {
        RecordType::DeliverableUnit
    }
}

enum Parent<'a> {
    None,
    Unit(&'a str),
    Unreadable,
}

/// Deliverable unit a manifestation belongs to. Only manifestations have one.
fn parent_unit(metadata: &str) -> Parent<'_> {
    if !MANIFESTATION.is_match(metadata) {
        return Parent::None;
    }
    match DELIVERABLE_UNIT_REF.captures(metadata).and_then(|c| c.get(1)) {
        Some(unit) => Parent::Unit(unit.as_str()),
        None => Parent::Unreadable,
    }
}

impl RecordClassifier for Preservation5Classifier {
    fn classify(&mut self, record: &HarvestRecord) -> ClassificationResult {
        let record_type = record_type(&record.id);
        let origin = self.origin(record);

        let parent_id = match parent_unit(&record.metadata_xml) {
            Parent::None => None,
            Parent::Unit(unit) => Some(format!("{}:oai:du:{}", origin, unit)),
            Parent::Unreadable => {
                warn!(record = %record.id, "Manifestation without a readable DeliverableUnitRef");
                count_drop(&mut self.stats.missing_parent, "manifestation without parent", &record.id);
                return ClassificationResult::dropped(record, origin, record_type);
            }
        };

        ClassificationResult::accepted(record, origin, parent_id, record_type)
    }

    fn stats(&self) -> FilterStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "preservation5"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ORIGIN_RADIO, ORIGIN_TV};

    const UNIT: &str = "0a1b2c3d-4e5f-6789-abcd-ef0123456789";

    fn record(id: &str, metadata: &str) -> HarvestRecord {
        HarvestRecord {
            id: id.into(),
            metadata_xml: metadata.into(),
            date_stamp: "2022-07-12".into(),
            deleted: false,
        }
    }

    #[test]
    fn moving_image_goes_to_tv() {
        let mut c = Preservation5Classifier::new("ds.preservica");
        let result = c.classify(&record(
            "oai:du:1",
            "<xip:DeliverableUnit><formatMediaType>Moving Image</formatMediaType></xip:DeliverableUnit>",
        ));
        assert!(result.accept);
        assert_eq!(result.origin, ORIGIN_TV);
        assert_eq!(result.sink_id, "ds.tv:oai:du:1");
        assert_eq!(result.record_type, RecordType::DeliverableUnit);
        assert_eq!(result.parent_id, None);
    }

    #[test]
    fn sound_goes_to_radio() {
        let mut c = Preservation5Classifier::new("ds.preservica");
        let result = c.classify(&record("oai:col:7", "<formatMediaType> Sound </formatMediaType>"));
        assert_eq!(result.origin, ORIGIN_RADIO);
        assert_eq!(result.record_type, RecordType::Collection);
    }

    #[test]
    fn unknown_media_type_falls_back_to_datasource() {
        let mut c = Preservation5Classifier::new("ds.preservica");
        let result = c.classify(&record("oai:du:2", "<formatMediaType>Text</formatMediaType>"));
        assert!(result.accept);
        assert_eq!(result.origin, "ds.preservica");
        assert_eq!(c.stats().unknown_origin, 1);
    }

    #[test]
    fn manifestation_links_to_its_deliverable_unit() {
        let mut c = Preservation5Classifier::new("ds.preservica");
        let metadata = format!(
            "<xip:Manifestation><formatMediaType>Sound</formatMediaType><DeliverableUnitRef>{UNIT}</DeliverableUnitRef></xip:Manifestation>"
        );
        let result = c.classify(&record("oai:man:3", &metadata));
        assert!(result.accept);
        assert_eq!(result.record_type, RecordType::Manifestation);
        assert_eq!(result.parent_id, Some(format!("ds.radio:oai:du:{UNIT}")));
    }

    #[test]
    fn unit_reference_is_ignored_outside_manifestations() {
        let mut c = Preservation5Classifier::new("ds.preservica");
        let metadata = format!("<xip:DeliverableUnit><DeliverableUnitRef>{UNIT}</DeliverableUnitRef></xip:DeliverableUnit>");
        assert_eq!(c.classify(&record("oai:du:4", &metadata)).parent_id, None);
    }

    #[test]
    fn manifestation_with_unreadable_parent_is_dropped() {
        let mut c = Preservation5Classifier::new("ds.preservica");
        let result = c.classify(&record(
            "oai:man:5",
            "<xip:Manifestation><DeliverableUnitRef>short</DeliverableUnitRef></xip:Manifestation>",
        ));
        assert!(!result.accept);
        assert_eq!(c.stats().missing_parent, 1);
    }

    #[test]
    fn record_type_follows_the_identifier() {
        assert_eq!(record_type("oai:col:1"), RecordType::Collection);
        assert_eq!(record_type("oai:du:1"), RecordType::DeliverableUnit);
        assert_eq!(record_type("oai:man:1"), RecordType::Manifestation);
        assert_eq!(record_type("something-else"), RecordType::DeliverableUnit);
    }
}
