use crate::error::DecodeError;
use crate::models::{pad_station_code, MeasurementRecord, RecordKind, StationRecord};
use crate::utils::constants::{MEASUREMENT_MIN_FIELDS, MISSING_VALUE_SENTINEL};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;
use validator::Validate;

// Expected layout:
// Stations_id von_datum bis_datum Stationshoehe geoBreite geoLaenge Stationsname Bundesland
// 00003 19500401 20110331            202     50.7827    6.0941 Aachen  ...  Nordrhein-Westfalen
static STATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.{5}) (.{8}) (.{8}) (.{14}) (.{11}) (.{9})(?: (.{0,40})(?: (.*))?)?$")
        .expect("station line pattern is valid")
});

/// A decoded line of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    Station(StationRecord),
    Measurement(MeasurementRecord),
}

/// Records that can be decoded from one raw source line.
pub trait DecodeLine: Sized {
    fn decode_line(line: &str) -> Result<Self, DecodeError>;
}

impl DecodeLine for StationRecord {
    fn decode_line(line: &str) -> Result<Self, DecodeError> {
        parse_station_line(line)
    }
}

impl DecodeLine for MeasurementRecord {
    fn decode_line(line: &str) -> Result<Self, DecodeError> {
        parse_measurement_line(line)
    }
}

pub fn parse_line(line: &str, kind: RecordKind) -> Result<ParsedRecord, DecodeError> {
    match kind {
        RecordKind::Station => parse_station_line(line).map(ParsedRecord::Station),
        RecordKind::Measurement => parse_measurement_line(line).map(ParsedRecord::Measurement),
    }
}

/// Parse one fixed-width line of the station description file.
pub fn parse_station_line(line: &str) -> Result<StationRecord, DecodeError> {
    let caps = STATION_LINE
        .captures(line.trim_end_matches(['\r', '\n']))
        .ok_or(DecodeError::StationLayout)?;
    let field = |i: usize| caps.get(i).map_or("", |m| m.as_str());

    let station = StationRecord {
        station_id: parse_station_code(field(1))?,
        valid_from: parse_optional_date(field(2), "start date")?,
        valid_to: parse_optional_date(field(3), "end date")?,
        elevation: parse_optional_f32(field(4), "elevation")?,
        latitude: parse_optional_f32(field(5), "latitude")?,
        longitude: parse_optional_f32(field(6), "longitude")?,
        name: optional_text(field(7)),
        region: optional_text(field(8)),
    };

    station
        .validate()
        .map_err(|e| DecodeError::OutOfRange(e.to_string()))?;

    Ok(station)
}

/// Parse one `;`-separated measurement line:
/// `STATIONS_ID;MESS_DATUM;QN;PP_10;TT_10;TM5_10;RF_10;TD_10[;eor]`
pub fn parse_measurement_line(line: &str) -> Result<MeasurementRecord, DecodeError> {
    let parts: Vec<&str> = line.split(';').map(|s| s.trim()).collect();

    if parts.len() < MEASUREMENT_MIN_FIELDS {
        return Err(DecodeError::TooFewFields {
            expected: MEASUREMENT_MIN_FIELDS,
            found: parts.len(),
        });
    }

    let station_id = parse_station_code(parts[0])?;

    let measured_at = NaiveDateTime::parse_from_str(parts[1], "%Y%m%d%H%M").map_err(|_| {
        DecodeError::Date {
            field: "timestamp",
            value: parts[1].to_string(),
        }
    })?;

    let quality_flag = parts[2].parse::<i32>().map_err(|_| DecodeError::Number {
        field: "quality flag",
        value: parts[2].to_string(),
    })?;

    Ok(MeasurementRecord {
        station_id,
        measured_at,
        quality_flag,
        pressure: parse_optional_f32(parts[3], "pressure")?,
        air_temperature: parse_optional_f32(parts[4], "air temperature")?,
        ground_temperature: parse_optional_f32(parts[5], "ground temperature")?,
        relative_humidity: parse_optional_f32(parts[6], "relative humidity")?,
        dew_point: parse_optional_f32(parts[7], "dew point")?,
    })
}

/// Station codes are 1-5 ASCII digits, re-padded with leading zeros to five characters.
fn parse_station_code(raw: &str) -> Result<String, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 5 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::StationCode(raw.to_string()));
    }
    Ok(pad_station_code(trimmed))
}

fn is_missing(value: &str) -> bool {
    value.is_empty() || value == MISSING_VALUE_SENTINEL
}

/// Blank and `-999` map to `None`; any other unparsable or non-finite text is an error.
fn parse_optional_f32(raw: &str, field: &'static str) -> Result<Option<f32>, DecodeError> {
    let value = raw.trim();
    if is_missing(value) {
        return Ok(None);
    }

    let parsed = value.parse::<f32>().map_err(|_| DecodeError::Number {
        field,
        value: value.to_string(),
    })?;

    if !parsed.is_finite() {
        return Err(DecodeError::Number {
            field,
            value: value.to_string(),
        });
    }

    // "-999.0" and friends carry the same meaning as the literal sentinel
    if parsed == -999.0 {
        return Ok(None);
    }

    Ok(Some(parsed))
}

fn parse_optional_date(raw: &str, field: &'static str) -> Result<Option<NaiveDate>, DecodeError> {
    let value = raw.trim();
    if is_missing(value) {
        return Ok(None);
    }

    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map(Some)
        .map_err(|_| DecodeError::Date {
            field,
            value: value.to_string(),
        })
}

fn optional_text(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
