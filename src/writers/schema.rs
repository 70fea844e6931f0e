//! Destination schema and merge statements.

use crate::models::RecordKind;

pub const CREATE_STATIONS_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS stations (
    station_id   char(5) PRIMARY KEY,
    valid_from   date,
    valid_to     date,
    elevation    real,
    latitude     real,
    longitude    real,
    name         text,
    region       text
)";

pub const CREATE_MEASUREMENTS_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS measurements (
    station_id          char(5)   NOT NULL,
    measured_at         timestamp NOT NULL,
    quality_flag        integer   NOT NULL,
    pressure            real,
    air_temperature     real,
    ground_temperature  real,
    relative_humidity   real,
    dew_point           real,
    PRIMARY KEY (station_id, measured_at)
)";

/// Statements that bring an empty database to the expected schema. Safe to re-run.
pub fn bootstrap_statements() -> [&'static str; 2] {
    [CREATE_STATIONS_TABLE, CREATE_MEASUREMENTS_TABLE]
}

// Rows arrive as one jsonb array in $1. Sorting by key makes concurrent merges lock
// rows in the same order.
const MERGE_STATIONS: &str = "\
INSERT INTO stations AS t
    (station_id, valid_from, valid_to, elevation, latitude, longitude, name, region)
SELECT r.station_id, r.valid_from, r.valid_to, r.elevation, r.latitude, r.longitude, r.name, r.region
FROM jsonb_to_recordset($1::jsonb) AS r(
    station_id char(5), valid_from date, valid_to date, elevation real,
    latitude real, longitude real, name text, region text)
ORDER BY r.station_id
ON CONFLICT (station_id) DO UPDATE SET
    valid_from = EXCLUDED.valid_from,
    valid_to   = EXCLUDED.valid_to,
    elevation  = EXCLUDED.elevation,
    latitude   = EXCLUDED.latitude,
    longitude  = EXCLUDED.longitude,
    name       = EXCLUDED.name,
    region     = EXCLUDED.region";

const MERGE_MEASUREMENTS: &str = "\
INSERT INTO measurements AS t
    (station_id, measured_at, quality_flag, pressure, air_temperature,
     ground_temperature, relative_humidity, dew_point)
SELECT r.station_id, r.measured_at, r.quality_flag, r.pressure, r.air_temperature,
       r.ground_temperature, r.relative_humidity, r.dew_point
FROM jsonb_to_recordset($1::jsonb) AS r(
    station_id char(5), measured_at timestamp, quality_flag integer, pressure real,
    air_temperature real, ground_temperature real, relative_humidity real, dew_point real)
ORDER BY r.station_id, r.measured_at
ON CONFLICT (station_id, measured_at) DO UPDATE SET
    quality_flag       = EXCLUDED.quality_flag,
    pressure           = EXCLUDED.pressure,
    air_temperature    = EXCLUDED.air_temperature,
    ground_temperature = EXCLUDED.ground_temperature,
    relative_humidity  = EXCLUDED.relative_humidity,
    dew_point          = EXCLUDED.dew_point";

pub fn merge_statement(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Station => MERGE_STATIONS,
        RecordKind::Measurement => MERGE_MEASUREMENTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeasurementRecord, StationRecord};

    /// Every serialized field must appear as a column of the recordset definition.
    fn assert_columns_cover<T: serde::Serialize>(sample: &T, statement: &str) {
        let json = serde_json::to_value(sample).unwrap();
        let fields = json.as_object().unwrap();
        let recordset = statement.split("AS r(").nth(1).unwrap();
        for field in fields.keys() {
            assert!(
                recordset.contains(&format!("{} ", field)),
                "column {} missing from merge statement",
                field
            );
        }
    }

    #[test]
    fn test_merge_statements_match_record_fields() {
        assert_columns_cover(
            &StationRecord::new("01048".to_string()),
            merge_statement(RecordKind::Station),
        );

        let measurement = MeasurementRecord::new(
            "01048".to_string(),
            chrono::NaiveDate::from_ymd_opt(2021, 9, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            3,
        );
        assert_columns_cover(&measurement, merge_statement(RecordKind::Measurement));
    }

    #[test]
    fn test_bootstrap_is_idempotent_ddl() {
        for statement in bootstrap_statements() {
            assert!(statement.contains("IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_merge_conflict_targets_natural_keys() {
        assert!(merge_statement(RecordKind::Station).contains("ON CONFLICT (station_id)"));
        assert!(merge_statement(RecordKind::Measurement)
            .contains("ON CONFLICT (station_id, measured_at)"));
    }
}
