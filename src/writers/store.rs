use crate::error::StoreError;
use crate::models::MergeBatch;
use async_trait::async_trait;

/// The destination store, consumed only through text statements and set-based merges.
///
/// A merge inserts the batch's absent keys and updates the present ones as one atomic
/// operation, touching no other rows. Implementations must tolerate concurrent merges
/// with overlapping keys without duplicate-key violations; the batch handed in is
/// already free of repeated keys.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Execute a DDL or other text statement.
    async fn execute(&self, statement: &str) -> Result<(), StoreError>;

    /// Merge one batch; returns the number of rows inserted or updated.
    async fn merge(&self, batch: MergeBatch<'_>) -> Result<u64, StoreError>;
}
