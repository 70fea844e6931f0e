pub mod line_source;
pub mod record_parser;
pub mod record_reader;

pub use line_source::{LineSource, SourceLine};
pub use record_parser::{
    parse_line, parse_measurement_line, parse_station_line, DecodeLine, ParsedRecord,
};
pub use record_reader::{ReadStats, RecordFilter, RecordReader};
