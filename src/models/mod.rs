pub mod batch;
pub mod measurement;
pub mod station;

pub use batch::{Batch, MergeBatch, Record, RecordKind};
pub use measurement::MeasurementRecord;
pub use station::StationRecord;

/// Left-pad a station code with zeros to the canonical five characters.
pub fn pad_station_code(raw: &str) -> String {
    format!("{:0>5}", raw.trim())
}
