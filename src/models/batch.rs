use serde::Serialize;
use std::fmt;
use std::hash::Hash;

use super::{MeasurementRecord, StationRecord};
use crate::utils::constants::{MEASUREMENT_HEADER_LINES, STATION_HEADER_LINES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Station,
    Measurement,
}

impl RecordKind {
    /// Header lines preceding the data in a source of this kind.
    pub fn header_lines(&self) -> usize {
        match self {
            RecordKind::Station => STATION_HEADER_LINES,
            RecordKind::Measurement => MEASUREMENT_HEADER_LINES,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            RecordKind::Station => "stations",
            RecordKind::Measurement => "measurements",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Station => write!(f, "station"),
            RecordKind::Measurement => write!(f, "measurement"),
        }
    }
}

/// A record that can be deduplicated and merged into the destination store.
pub trait Record: Clone + Serialize + Send + Sync + 'static {
    type Key: Eq + Hash + Ord + Clone + fmt::Debug + Send;
    const KIND: RecordKind;

    fn key(&self) -> Self::Key;

    fn merge_batch(rows: &[Self]) -> MergeBatch<'_>;
}

/// The structured argument handed to the store in a single merge.
#[derive(Debug, Clone, Copy)]
pub enum MergeBatch<'a> {
    Stations(&'a [StationRecord]),
    Measurements(&'a [MeasurementRecord]),
}

impl MergeBatch<'_> {
    pub fn kind(&self) -> RecordKind {
        match self {
            MergeBatch::Stations(_) => RecordKind::Station,
            MergeBatch::Measurements(_) => RecordKind::Measurement,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MergeBatch::Stations(rows) => rows.len(),
            MergeBatch::Measurements(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows as one JSON array, column names matching the destination table.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            MergeBatch::Stations(rows) => serde_json::to_value(rows),
            MergeBatch::Measurements(rows) => serde_json::to_value(rows),
        }
    }
}

/// An ordered chunk of same-kind records: the unit of deduplication and of one write.
#[derive(Debug, Clone)]
pub struct Batch<R> {
    /// Zero-based position of this chunk within its source file.
    pub index: usize,
    pub records: Vec<R>,
}

impl<R: Record> Batch<R> {
    pub fn new(index: usize, records: Vec<R>) -> Self {
        Self { index, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_merge(&self) -> MergeBatch<'_> {
        R::merge_batch(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(code: &str) -> StationRecord {
        StationRecord::new(code.to_string())
    }

    #[test]
    fn test_merge_batch_kind() {
        let batch = Batch::new(0, vec![station("01048")]);
        let merge = batch.as_merge();
        assert_eq!(merge.kind(), RecordKind::Station);
        assert_eq!(merge.len(), 1);
        assert_eq!(merge.kind().table_name(), "stations");
    }
}
