use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::batch::{MergeBatch, Record, RecordKind};

/// One 10-minute observation. Natural key is `(station_id, measured_at)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub station_id: String,
    pub measured_at: NaiveDateTime,
    pub quality_flag: i32,
    /// Air pressure at station height (hPa).
    pub pressure: Option<f32>,
    /// Air temperature 2m above ground (°C).
    pub air_temperature: Option<f32>,
    /// Air temperature 5cm above ground (°C).
    pub ground_temperature: Option<f32>,
    /// Relative humidity (%).
    pub relative_humidity: Option<f32>,
    /// Dew point temperature (°C).
    pub dew_point: Option<f32>,
}

impl MeasurementRecord {
    pub fn new(station_id: String, measured_at: NaiveDateTime, quality_flag: i32) -> Self {
        Self {
            station_id,
            measured_at,
            quality_flag,
            pressure: None,
            air_temperature: None,
            ground_temperature: None,
            relative_humidity: None,
            dew_point: None,
        }
    }

    pub fn month(&self) -> u32 {
        self.measured_at.month()
    }
}

impl Record for MeasurementRecord {
    type Key = (String, NaiveDateTime);
    const KIND: RecordKind = RecordKind::Measurement;

    fn key(&self) -> Self::Key {
        (self.station_id.clone(), self.measured_at)
    }

    fn merge_batch(rows: &[Self]) -> MergeBatch<'_> {
        MergeBatch::Measurements(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_key_and_month() {
        let record = MeasurementRecord::new("01048".to_string(), at(2021, 9, 1, 0, 10), 3);
        assert_eq!(record.key(), ("01048".to_string(), at(2021, 9, 1, 0, 10)));
        assert_eq!(record.month(), 9);
        assert_eq!(record.air_temperature, None);
    }

    #[test]
    fn test_serializes_absent_readings_as_null() {
        let mut record = MeasurementRecord::new("01048".to_string(), at(2021, 9, 1, 0, 0), 3);
        record.air_temperature = Some(18.5);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["pressure"], serde_json::Value::Null);
        assert_eq!(json["air_temperature"], serde_json::json!(18.5));
        assert_eq!(json["measured_at"], "2021-09-01T00:00:00");
    }
}
