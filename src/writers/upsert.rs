use crate::error::StoreError;
use crate::models::{Batch, Record};
use crate::processors::retry::RetryPolicy;
use crate::writers::schema::bootstrap_statements;
use crate::writers::store::RecordStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Writes batches to the store through one set-based merge per batch, re-executing
/// the merge on transient faults. Re-executing is safe: a merge is idempotent.
#[derive(Clone)]
pub struct UpsertWriter {
    store: Arc<dyn RecordStore>,
    retry: RetryPolicy,
}

impl UpsertWriter {
    pub fn new(store: Arc<dyn RecordStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Create the destination schema if it does not exist yet.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        for statement in bootstrap_statements() {
            self.execute(statement).await?;
        }
        info!("Destination schema ready");
        Ok(())
    }

    pub async fn execute(&self, statement: &str) -> Result<(), StoreError> {
        self.retry
            .run("DDL", || self.store.execute(statement))
            .await
    }

    /// Merge one deduplicated batch. Returns the number of rows inserted or updated.
    pub async fn write<R: Record>(&self, batch: &Batch<R>) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let operation = format!("{} batch {}", R::KIND, batch.index);
        let affected = self
            .retry
            .run(&operation, || self.store.merge(batch.as_merge()))
            .await?;

        debug!("Wrote {} ({} rows)", operation, affected);
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeasurementRecord;
    use crate::writers::memory::InMemoryStore;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn writer(store: Arc<InMemoryStore>, max_retries: u32) -> UpsertWriter {
        UpsertWriter::new(
            store,
            RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(2)),
        )
    }

    fn batch() -> Batch<MeasurementRecord> {
        let at = NaiveDate::from_ymd_opt(2021, 9, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Batch::new(0, vec![MeasurementRecord::new("01048".to_string(), at, 3)])
    }

    #[tokio::test]
    async fn test_transient_faults_persist_exactly_once() {
        let store = Arc::new(InMemoryStore::new());
        for _ in 0..4 {
            store.inject_fault(StoreError::transient("lock request time out period exceeded"));
        }

        let affected = writer(store.clone(), 5).write(&batch()).await.unwrap();

        assert_eq!(affected, 1);
        assert_eq!(store.merge_calls(), 5);
        assert_eq!(store.measurement_count(), 1);
    }

    #[tokio::test]
    async fn test_fatal_fault_is_surfaced() {
        let store = Arc::new(InMemoryStore::new());
        store.inject_fault(StoreError::fatal("relation \"measurements\" does not exist"));

        let err = writer(store.clone(), 5).write(&batch()).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(store.merge_calls(), 1);
        assert_eq!(store.measurement_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_store() {
        let store = Arc::new(InMemoryStore::new());
        let empty: Batch<MeasurementRecord> = Batch::new(0, Vec::new());

        assert_eq!(writer(store.clone(), 5).write(&empty).await.unwrap(), 0);
        assert_eq!(store.merge_calls(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_runs_ddl() {
        let store = Arc::new(InMemoryStore::new());
        writer(store.clone(), 0).bootstrap().await.unwrap();
        assert_eq!(store.statements().len(), 2);
    }
}
