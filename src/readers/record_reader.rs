use crate::error::Result;
use crate::models::{Batch, Record};
use crate::readers::line_source::LineSource;
use crate::readers::record_parser::DecodeLine;
use crate::utils::constants::MAX_LOGGED_DECODE_FAILURES;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Predicate applied to decoded records before batching.
pub type RecordFilter<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// Counters kept while reading one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: usize,
    pub decoded: usize,
    pub decode_failures: usize,
    pub filtered_out: usize,
}

/// Decodes a line source into fixed-size batches.
///
/// A line that fails to decode is skipped and counted; it never aborts the file.
/// Only an I/O failure of the underlying source ends the stream with an error.
pub struct RecordReader<R> {
    source: LineSource,
    batch_size: usize,
    filter: Option<RecordFilter<R>>,
    next_index: usize,
    stats: ReadStats,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record + DecodeLine> RecordReader<R> {
    pub fn new(source: LineSource, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            filter: None,
            next_index: 0,
            stats: ReadStats::default(),
            _record: PhantomData,
        }
    }

    pub fn with_filter(mut self, filter: Option<RecordFilter<R>>) -> Self {
        self.filter = filter;
        self
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    fn record_failure(&mut self, line_number: usize, text: &str, reason: &dyn std::fmt::Display) {
        self.stats.decode_failures += 1;
        if self.stats.decode_failures <= MAX_LOGGED_DECODE_FAILURES {
            warn!(
                "{}:{}: skipping {} line ({}): {:?}",
                self.source.path().display(),
                line_number,
                R::KIND,
                reason,
                text
            );
        } else {
            debug!(
                "{}:{}: skipping {} line ({})",
                self.source.path().display(),
                line_number,
                R::KIND,
                reason
            );
        }
    }
}

impl<R: Record + DecodeLine> Iterator for RecordReader<R> {
    type Item = Result<Batch<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut records = Vec::with_capacity(self.batch_size.min(8192));

        while records.len() < self.batch_size {
            let line = match self.source.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            };
            self.stats.lines += 1;

            let record = match R::decode_line(&line.text) {
                Ok(record) => record,
                Err(e) => {
                    self.record_failure(line.number, &line.text, &e);
                    continue;
                }
            };
            self.stats.decoded += 1;

            if let Some(filter) = &self.filter {
                if !filter(&record) {
                    self.stats.filtered_out += 1;
                    continue;
                }
            }

            records.push(record);
        }

        if records.is_empty() {
            return None;
        }

        let batch = Batch::new(self.next_index, records);
        self.next_index += 1;
        Some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeasurementRecord;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn archive(dir: &TempDir, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("10minutenwerte_TU_01048_akt.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&path).unwrap());
        zip.start_file("produkt_zehn_min_tu_01048.txt", FileOptions::default())
            .unwrap();
        writeln!(zip, "STATIONS_ID;MESS_DATUM;QN;PP_10;TT_10;TM5_10;RF_10;TD_10;eor").unwrap();
        for line in lines {
            writeln!(zip, "{}", line).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    #[test]
    fn test_batches_skip_bad_lines() -> Result<()> {
        let dir = TempDir::new()?;
        let path = archive(
            &dir,
            &[
                "1048;202109010000;3;-999;18.5;17.2;65.0;11.0;eor",
                "1048;202109010010;3;-999;18.4;xx;65.0;11.0;eor",
                "1048;202109010020;3;-999;18.3;17.0;66.0;11.1;eor",
                "1048;2021",
                "1048;202109010030;3;-999;18.2;16.9;66.0;11.1;eor",
            ],
        );

        let mut reader: RecordReader<MeasurementRecord> =
            RecordReader::new(LineSource::open_archive(&path)?, 2);
        let batches: Vec<_> = reader.by_ref().collect::<Result<_>>()?;

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1].index, 1);
        assert_eq!(
            reader.stats(),
            ReadStats {
                lines: 5,
                decoded: 3,
                decode_failures: 2,
                filtered_out: 0,
            }
        );
        Ok(())
    }

    #[test]
    fn test_filter_drops_records() -> Result<()> {
        let dir = TempDir::new()?;
        let path = archive(
            &dir,
            &[
                "1048;202108312350;3;-999;18.5;17.2;65.0;11.0;eor",
                "1048;202109010000;3;-999;18.4;17.1;65.0;11.0;eor",
            ],
        );

        let september: RecordFilter<MeasurementRecord> = Arc::new(|r| r.month() == 9);
        let mut reader = RecordReader::new(LineSource::open_archive(&path)?, 10)
            .with_filter(Some(september));
        let batch = reader.next().unwrap()?;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].month(), 9);
        assert_eq!(reader.stats().filtered_out, 1);
        assert!(reader.next().is_none());
        Ok(())
    }
}
