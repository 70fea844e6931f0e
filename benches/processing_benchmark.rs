use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dwd_ingest::models::{Batch, MeasurementRecord};
use dwd_ingest::processors::deduplicate_batch;
use dwd_ingest::readers::{parse_measurement_line, parse_station_line};

// Ten-minute lines for one station, starting 2021-09-01
fn create_measurement_lines(count: usize) -> Vec<String> {
    let start = NaiveDate::from_ymd_opt(2021, 9, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    (0..count)
        .map(|i| {
            let at = start + Duration::minutes(10 * i as i64);
            format!(
                "       1048;{};    3;-999;{:>5.1};  17.2;  65.0;  11.0;eor",
                at.format("%Y%m%d%H%M"),
                10.0 + (i % 100) as f32 * 0.1
            )
        })
        .collect()
}

// Every record repeated `copies` times, interleaved
fn create_duplicated_records(unique: usize, copies: usize) -> Vec<MeasurementRecord> {
    let lines = create_measurement_lines(unique);
    let records: Vec<MeasurementRecord> = lines
        .iter()
        .filter_map(|line| parse_measurement_line(line).ok())
        .collect();

    let mut out = Vec::with_capacity(unique * copies);
    for _ in 0..copies {
        out.extend(records.iter().cloned());
    }
    out
}

fn benchmark_measurement_parsing(c: &mut Criterion) {
    let lines = create_measurement_lines(1_000);

    c.bench_function("parse_measurement_lines", |b| {
        b.iter(|| {
            let decoded = lines
                .iter()
                .filter(|line| parse_measurement_line(line).is_ok())
                .count();
            black_box(decoded)
        })
    });
}

fn benchmark_station_parsing(c: &mut Criterion) {
    let lines: Vec<String> = (1..=500)
        .map(|id| {
            format!(
                "{:05} 19370101 20221231 {:>14} {:>11} {:>9} {:<40} Sachsen",
                id, "228", "51.1278", "13.7543", "Dresden-Klotzsche"
            )
        })
        .collect();

    c.bench_function("parse_station_lines", |b| {
        b.iter(|| {
            let decoded = lines
                .iter()
                .filter(|line| parse_station_line(line).is_ok())
                .count();
            black_box(decoded)
        })
    });
}

fn benchmark_deduplication_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("deduplicate_batch");

    for &size in &[1_000, 10_000, 80_000] {
        group.bench_with_input(BenchmarkId::new("records", size), &size, |b, &size| {
            let records = create_duplicated_records(size / 2, 2);
            b.iter(|| {
                let deduped = deduplicate_batch(Batch::new(0, records.clone()));
                black_box(deduped.duplicates_dropped)
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_measurement_parsing,
    benchmark_station_parsing,
    benchmark_deduplication_by_size
);
criterion_main!(benches);
