use crate::error::StoreError;
use crate::models::{MeasurementRecord, MergeBatch, Record, StationRecord};
use crate::writers::store::RecordStore;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    stations: BTreeMap<String, StationRecord>,
    measurements: BTreeMap<(String, NaiveDateTime), MeasurementRecord>,
}

/// In-memory store with the same merge contract as the PostgreSQL store.
///
/// Each merge applies its whole batch under one lock, so concurrent merges are
/// serialized and the last one to commit wins for a shared key. Faults queued with
/// [`InMemoryStore::inject_fault`] are returned by the next merges before any data
/// is touched.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<VecDeque<StoreError>>,
    statements: Mutex<Vec<String>>,
    merge_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next merge with `fault`. Faults queue up in order.
    pub fn inject_fault(&self, fault: StoreError) {
        lock(&self.faults).push_back(fault);
    }

    pub fn merge_calls(&self) -> usize {
        self.merge_calls.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }

    pub fn station_count(&self) -> usize {
        lock(&self.tables).stations.len()
    }

    pub fn measurement_count(&self) -> usize {
        lock(&self.tables).measurements.len()
    }

    pub fn station(&self, station_id: &str) -> Option<StationRecord> {
        lock(&self.tables).stations.get(station_id).cloned()
    }

    pub fn measurement(&self, station_id: &str, at: NaiveDateTime) -> Option<MeasurementRecord> {
        lock(&self.tables)
            .measurements
            .get(&(station_id.to_string(), at))
            .cloned()
    }

    pub fn measurements(&self) -> Vec<MeasurementRecord> {
        lock(&self.tables).measurements.values().cloned().collect()
    }
}

/// A single set-based statement cannot touch the same row twice.
fn ensure_unique_keys<R: Record>(rows: &[R]) -> Result<(), StoreError> {
    let mut seen = HashSet::with_capacity(rows.len());
    match rows.iter().find(|row| !seen.insert(row.key())) {
        Some(row) => Err(StoreError::fatal(format!(
            "merge would affect row {:?} a second time",
            row.key()
        ))),
        None => Ok(()),
    }
}

fn upsert<R: Record>(table: &mut BTreeMap<R::Key, R>, rows: &[R]) -> u64 {
    for row in rows {
        table.insert(row.key(), row.clone());
    }
    rows.len() as u64
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn execute(&self, statement: &str) -> Result<(), StoreError> {
        lock(&self.statements).push(statement.to_string());
        Ok(())
    }

    async fn merge(&self, batch: MergeBatch<'_>) -> Result<u64, StoreError> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);

        // Stand-in for the network round trip
        tokio::task::yield_now().await;

        if let Some(fault) = lock(&self.faults).pop_front() {
            return Err(fault);
        }

        let affected = match batch {
            MergeBatch::Stations(rows) => {
                ensure_unique_keys(rows)?;
                upsert(&mut lock(&self.tables).stations, rows)
            }
            MergeBatch::Measurements(rows) => {
                ensure_unique_keys(rows)?;
                upsert(&mut lock(&self.tables).measurements, rows)
            }
        };

        debug!("Merged {} rows into {} (memory)", affected, batch.kind().table_name());
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 9, 1)
            .unwrap()
            .and_hms_opt(0, minute, 0)
            .unwrap()
    }

    fn measurement(minute: u32, temperature: f32) -> MeasurementRecord {
        let mut record = MeasurementRecord::new("01048".to_string(), at(minute), 3);
        record.air_temperature = Some(temperature);
        record
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let store = InMemoryStore::new();
        let rows = vec![measurement(0, 18.5), measurement(10, 18.4)];

        store.merge(MergeBatch::Measurements(&rows)).await.unwrap();
        let once = store.measurements();
        store.merge(MergeBatch::Measurements(&rows)).await.unwrap();

        assert_eq!(store.measurements(), once);
        assert_eq!(store.measurement_count(), 2);
    }

    #[tokio::test]
    async fn test_later_batch_wins() {
        let store = InMemoryStore::new();

        store
            .merge(MergeBatch::Measurements(&[measurement(0, 18.5)]))
            .await
            .unwrap();
        store
            .merge(MergeBatch::Measurements(&[measurement(0, 20.0), measurement(10, 1.0)]))
            .await
            .unwrap();

        assert_eq!(
            store.measurement("01048", at(0)).unwrap().air_temperature,
            Some(20.0)
        );
        assert_eq!(store.measurement_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_one_merge_are_rejected() {
        let store = InMemoryStore::new();
        let rows = vec![measurement(0, 1.0), measurement(0, 2.0)];

        let err = store
            .merge(MergeBatch::Measurements(&rows))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(store.measurement_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_fault_leaves_tables_untouched() {
        let store = InMemoryStore::new();
        store.inject_fault(StoreError::transient("deadlock detected"));

        let rows = vec![StationRecord::new("01048".to_string())];
        assert!(store.merge(MergeBatch::Stations(&rows)).await.is_err());
        assert_eq!(store.station_count(), 0);

        assert_eq!(store.merge(MergeBatch::Stations(&rows)).await.unwrap(), 1);
        assert!(store.station("01048").is_some());
        assert_eq!(store.merge_calls(), 2);
    }
}
