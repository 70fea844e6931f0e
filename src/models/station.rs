use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::batch::{MergeBatch, Record, RecordKind};

/// One row of the station description file.
///
/// Blank source fields are `None`, never an empty string or zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StationRecord {
    #[validate(length(equal = 5))]
    pub station_id: String,

    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,

    pub elevation: Option<f32>,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f32>,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f32>,

    pub name: Option<String>,
    pub region: Option<String>,
}

impl StationRecord {
    pub fn new(station_id: String) -> Self {
        Self {
            station_id,
            valid_from: None,
            valid_to: None,
            elevation: None,
            latitude: None,
            longitude: None,
            name: None,
            region: None,
        }
    }
}

impl Record for StationRecord {
    type Key = String;
    const KIND: RecordKind = RecordKind::Station;

    fn key(&self) -> String {
        self.station_id.clone()
    }

    fn merge_batch(rows: &[Self]) -> MergeBatch<'_> {
        MergeBatch::Stations(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_validation() {
        let mut station = StationRecord::new("01048".to_string());
        station.latitude = Some(51.1278);
        station.longitude = Some(13.7543);
        assert!(station.validate().is_ok());

        station.latitude = Some(91.0);
        assert!(station.validate().is_err());
    }

    #[test]
    fn test_station_code_length_validation() {
        let station = StationRecord::new("1048".to_string());
        assert!(station.validate().is_err());
    }
}
