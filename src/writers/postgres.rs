use crate::error::{ProcessingError, Result, StoreError};
use crate::models::MergeBatch;
use crate::writers::schema::merge_statement;
use crate::writers::store::RecordStore;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use tracing::debug;

const POOL_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL destination. Every operation checks a connection out of the pool and
/// returns it when done; connections are never held across batches.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn connect(database_url: &str, pool_size: usize) -> Result<Self> {
        let pg_config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e: tokio_postgres::Error| ProcessingError::Config(e.to_string()))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(POOL_WAIT_TIMEOUT))
            .build()
            .map_err(|e| ProcessingError::Config(e.to_string()))?;

        Ok(Self { pool })
    }

    async fn client(&self) -> std::result::Result<deadpool_postgres::Object, StoreError> {
        self.pool.get().await.map_err(classify_pool_error)
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn execute(&self, statement: &str) -> std::result::Result<(), StoreError> {
        let client = self.client().await?;
        client
            .batch_execute(statement)
            .await
            .map_err(|e| classify_pg_error(&e))
    }

    async fn merge(&self, batch: MergeBatch<'_>) -> std::result::Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let rows = batch
            .to_json()
            .map_err(|e| StoreError::fatal(format!("failed to encode batch: {}", e)))?;

        let client = self.client().await?;
        let affected = client
            .execute(merge_statement(batch.kind()), &[&rows])
            .await
            .map_err(|e| classify_pg_error(&e))?;

        debug!("Merged {} {} rows", affected, batch.kind());
        Ok(affected)
    }
}

/// SQLSTATE codes worth re-executing: serialization/deadlock/lock contention,
/// resource exhaustion, server restarts and connection exceptions (class 08).
pub fn is_transient_sqlstate(code: &SqlState) -> bool {
    let code = code.code();
    matches!(
        code,
        "40001" | "40P01" | "55P03" | "57014" | "53000" | "53200" | "53300" | "53400" | "57P01"
            | "57P02" | "57P03"
    ) || code.starts_with("08")
}

pub fn classify_pg_error(err: &tokio_postgres::Error) -> StoreError {
    let message = match err.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => err.to_string(),
    };

    let transient = match err.code() {
        Some(code) => is_transient_sqlstate(code),
        // No SQLSTATE: failed before or outside the server, e.g. connect or lost socket
        None => {
            err.is_closed()
                || std::error::Error::source(err).is_some_and(|s| s.is::<std::io::Error>())
        }
    };

    if transient {
        StoreError::transient(message)
    } else {
        StoreError::fatal(message)
    }
}

fn classify_pool_error(err: PoolError) -> StoreError {
    match err {
        PoolError::Timeout(kind) => StoreError::transient(format!("pool timeout: {:?}", kind)),
        PoolError::Backend(e) => classify_pg_error(&e),
        other => StoreError::fatal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_sqlstates() {
        for code in ["40001", "40P01", "55P03", "57014", "53300", "57P03", "08006", "08001"] {
            assert!(
                is_transient_sqlstate(&SqlState::from_code(code)),
                "{} should be transient",
                code
            );
        }
    }

    #[test]
    fn test_fatal_sqlstates() {
        for code in ["23505", "42P01", "42703", "22P02", "21000", "53100"] {
            assert!(
                !is_transient_sqlstate(&SqlState::from_code(code)),
                "{} should be fatal",
                code
            );
        }
    }

    #[test]
    fn test_connect_rejects_malformed_url() {
        assert!(matches!(
            PostgresStore::connect("postgres://user@host:notaport/db", 2),
            Err(ProcessingError::Config(_))
        ));
    }
}
