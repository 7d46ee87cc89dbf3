//! Per-dialect record classification.
//!
//! A classifier decides for each harvested record whether it is kept, which
//! origin it is filed under, what its parent is and what type it has. It does
//! no I/O; the only state it carries is its own drop counters, so one instance
//! is created per harvest run.

pub mod default;
pub mod dr_archive;
pub mod preservation5;
pub mod preservation7;

use crate::model::{ClassificationResult, HarvestRecord};
use harvester_core::{FilterKind, Target};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::info;

pub use default::DefaultClassifier;
pub use dr_archive::DrArchiveClassifier;
pub use preservation5::Preservation5Classifier;
pub use preservation7::Preservation7Classifier;

pub const ORIGIN_TV: &str = "ds.tv";
pub const ORIGIN_RADIO: &str = "ds.radio";

/// Drops are logged once per this many occurrences of the same reason.
const DROP_LOG_INTERVAL: u64 = 1000;

pub trait RecordClassifier: Send {
    fn classify(&mut self, record: &HarvestRecord) -> ClassificationResult;

    /// Drop counters accumulated by this instance.
    fn stats(&self) -> FilterStats;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub structural_folders: u64,
    pub empty_metadata: u64,
    pub transcoding_pending: u64,
    pub publisher_mismatch: u64,
    pub missing_parent: u64,
    pub unknown_origin: u64,
}

impl FilterStats {
    pub fn total_dropped(&self) -> u64 {
        self.structural_folders
            + self.empty_metadata
            + self.transcoding_pending
            + self.publisher_mismatch
            + self.missing_parent
    }
}

pub fn for_target(target: &Target) -> Box<dyn RecordClassifier> {
    let datasource = target.datasource.clone();
    match target.filter {
        FilterKind::Default => Box::new(DefaultClassifier::new(datasource)),
        FilterKind::Preservation5 => Box::new(Preservation5Classifier::new(datasource)),
        FilterKind::Preservation7 => Box::new(Preservation7Classifier::new(datasource)),
        FilterKind::DrArchive => Box::new(DrArchiveClassifier::new(datasource)),
    }
}

/// Bumps a drop counter and logs on every [`DROP_LOG_INTERVAL`]th occurrence.
fn count_drop(counter: &mut u64, reason: &str, record_id: &str) {
    *counter += 1;
    if *counter % DROP_LOG_INTERVAL == 0 {
        info!(
            reason,
            occurrences = *counter,
            last_record = record_id,
            "Dropped {} records so far: {}",
            *counter,
            reason
        );
    }
}

/// Picks the radio or TV origin from the media-type marker in the metadata.
fn media_origin(
    metadata: &str,
    moving_image: &Lazy<Regex>,
    sound: &Lazy<Regex>,
) -> Option<&'static str> {
    if moving_image.is_match(metadata) {
        Some(ORIGIN_TV)
    } else if sound.is_match(metadata) {
        Some(ORIGIN_RADIO)
    } else {
        None
    }
}
