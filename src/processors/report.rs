use crate::readers::ReadStats;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of loading one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub lines: usize,
    pub decoded: usize,
    pub decode_failures: usize,
    pub filtered_out: usize,
    pub duplicates_dropped: usize,
    pub batches: usize,
    pub rows_written: u64,
}

impl FileReport {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    pub fn apply_read_stats(&mut self, stats: ReadStats) {
        self.lines = stats.lines;
        self.decoded = stats.decoded;
        self.decode_failures = stats.decode_failures;
        self.filtered_out = stats.filtered_out;
    }

    fn accumulate(&mut self, other: &FileReport) {
        self.lines += other.lines;
        self.decoded += other.decoded;
        self.decode_failures += other.decode_failures;
        self.filtered_out += other.filtered_out;
        self.duplicates_dropped += other.duplicates_dropped;
        self.batches += other.batches;
        self.rows_written += other.rows_written;
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub stations: FileReport,
    pub measurement_files: Vec<FileReport>,
    pub elapsed: Duration,
}

impl IngestReport {
    /// Sum over all measurement files.
    pub fn measurement_totals(&self) -> FileReport {
        let mut totals = FileReport::default();
        for report in &self.measurement_files {
            totals.accumulate(report);
        }
        totals
    }

    pub fn summary(&self) -> String {
        let totals = self.measurement_totals();
        let mut summary = format!(
            "Ingest Summary:\n  Stations: {} rows written ({} lines, {} skipped, {} duplicates)\n",
            self.stations.rows_written,
            self.stations.lines,
            self.stations.decode_failures,
            self.stations.duplicates_dropped
        );

        summary.push_str(&format!(
            "  Measurements: {} rows written from {} archives in {} batches\n",
            totals.rows_written,
            self.measurement_files.len(),
            totals.batches
        ));
        summary.push_str(&format!(
            "    Lines: {}, decoded: {}, skipped: {}, filtered: {}, duplicates: {}\n",
            totals.lines,
            totals.decoded,
            totals.decode_failures,
            totals.filtered_out,
            totals.duplicates_dropped
        ));
        summary.push_str(&format!("  Elapsed: {:.1}s\n", self.elapsed.as_secs_f64()));

        // Skipped lines and dropped duplicates are data-quality tradeoffs, surface them
        let noisy: Vec<_> = self
            .measurement_files
            .iter()
            .filter(|r| r.decode_failures > 0)
            .collect();
        if !noisy.is_empty() {
            summary.push_str("  Files with skipped lines:\n");
            for report in noisy {
                summary.push_str(&format!(
                    "    {}: {}\n",
                    report.path.display(),
                    report.decode_failures
                ));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, rows: u64, failures: usize) -> FileReport {
        FileReport {
            path: PathBuf::from(name),
            lines: rows as usize + failures,
            decoded: rows as usize,
            decode_failures: failures,
            batches: 1,
            rows_written: rows,
            ..FileReport::default()
        }
    }

    #[test]
    fn test_measurement_totals() {
        let report = IngestReport {
            measurement_files: vec![file("a.zip", 10, 0), file("b.zip", 5, 2)],
            ..IngestReport::default()
        };

        let totals = report.measurement_totals();
        assert_eq!(totals.rows_written, 15);
        assert_eq!(totals.decode_failures, 2);
        assert_eq!(totals.batches, 2);
    }

    #[test]
    fn test_summary_lists_files_with_skipped_lines() {
        let report = IngestReport {
            measurement_files: vec![file("a.zip", 10, 0), file("b.zip", 5, 2)],
            ..IngestReport::default()
        };

        let summary = report.summary();
        assert!(summary.contains("15 rows written from 2 archives"));
        assert!(summary.contains("b.zip: 2"));
        assert!(!summary.contains("a.zip"));
    }
}
