//! # Event Loading
//!
//! Reads labelled feature vectors for the command-line harness. The format is
//! tab-separated with no header:
//!
//! ```text
//! 1	0:0	3:17	5:2
//! 0	0:0	3:4	5:9
//! ```
//!
//! The first column is the label (`1`, `0`, `true` or `false`); every other
//! column is a `feature_id:value_id` key. Each row must carry exactly the number
//! of keys the model was configured with. Keys are taken as given; no feature
//! extraction or hashing happens here.

use crate::belief::{FeatureKey, ParseFeatureKeyError};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// One labelled observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingEvent {
    pub label: bool,
    pub features: Vec<FeatureKey>,
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Error reading tab-separated events: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Line {line}: invalid label '{value}'. Expected one of 1, 0, true, false.")]
    InvalidLabel { line: u64, value: String },
    #[error("Line {line}: {source}")]
    InvalidFeature {
        line: u64,
        #[source]
        source: ParseFeatureKeyError,
    },
    #[error("Line {line}: found {found} feature keys, but the model expects {expected}.")]
    ArityMismatch {
        line: u64,
        found: usize,
        expected: usize,
    },
    #[error("The event file contains no rows.")]
    Empty,
}

/// Loads every event from `path`, validating each row against `num_features`.
pub fn load_events(path: impl AsRef<Path>, num_features: usize) -> Result<Vec<TrainingEvent>, DataError> {
    let file = File::open(path)?;
    read_events(file, num_features)
}

/// Parses events from any reader. See the module docs for the format.
pub fn read_events<R: Read>(reader: R, num_features: usize) -> Result<Vec<TrainingEvent>, DataError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut events = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |pos| pos.line());
        events.push(internal::parse_record(&record, line, num_features)?);
    }

    if events.is_empty() {
        return Err(DataError::Empty);
    }
    log::debug!("Loaded {} events with {num_features} features each", events.len());
    Ok(events)
}

mod internal {
    use super::*;

    pub(super) fn parse_label(value: &str, line: u64) -> Result<bool, DataError> {
        match value.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            other => Err(DataError::InvalidLabel {
                line,
                value: other.to_string(),
            }),
        }
    }

    pub(super) fn parse_record(
        record: &csv::StringRecord,
        line: u64,
        num_features: usize,
    ) -> Result<TrainingEvent, DataError> {
        let mut fields = record.iter();
        let label = parse_label(fields.next().unwrap_or(""), line)?;

        let features = fields
            .map(|field| {
                field
                    .parse::<FeatureKey>()
                    .map_err(|source| DataError::InvalidFeature { line, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if features.len() != num_features {
            return Err(DataError::ArityMismatch {
                line,
                found: features.len(),
                expected: num_features,
            });
        }
        Ok(TrainingEvent { label, features })
    }
}
