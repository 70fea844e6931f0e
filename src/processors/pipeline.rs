use crate::archive::{discover_archives, populate_if_empty, RemoteSource};
use crate::config::IngestConfig;
use crate::error::{ProcessingError, Result};
use crate::models::{MeasurementRecord, Record, StationRecord};
use crate::processors::deduplicator::deduplicate_batch;
use crate::processors::report::{FileReport, IngestReport};
use crate::readers::{DecodeLine, LineSource, RecordFilter, RecordReader};
use crate::utils::progress::ProgressReporter;
use crate::writers::{RecordStore, UpsertWriter};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Bootstrapped,
    LoadingStations,
    LoadingMeasurements,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Bootstrapped => "bootstrapped",
            RunPhase::LoadingStations => "loading stations",
            RunPhase::LoadingMeasurements => "loading measurements",
            RunPhase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Restrict measurements to one calendar month, regardless of year.
pub fn month_filter(month: u32) -> RecordFilter<MeasurementRecord> {
    Arc::new(move |record: &MeasurementRecord| record.month() == month)
}

/// What a worker needs to load one file end to end.
#[derive(Clone)]
struct FileContext {
    writer: UpsertWriter,
    batch_size: usize,
    cancel: CancellationToken,
}

/// Drives a run: bootstrap, then stations sequentially, then all archives on a
/// bounded pool of workers.
///
/// Each worker owns one archive at a time from open to last batch. The first fatal
/// failure cancels the run: batches already merging finish, no new batch starts, and
/// the error is returned once every worker has stopped.
pub struct IngestPipeline {
    config: IngestConfig,
    store: Arc<dyn RecordStore>,
    cancel: CancellationToken,
    progress: Option<Arc<ProgressReporter>>,
    remote: Option<Arc<dyn RemoteSource>>,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config,
            store,
            cancel: CancellationToken::new(),
            progress: None,
            remote: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<IngestReport> {
        let started = Instant::now();

        if let Some(remote) = &self.remote {
            populate_if_empty(&self.config.source_dir, remote.as_ref()).await?;
        }

        self.writer().bootstrap().await?;
        info!("Run phase: {}", RunPhase::Bootstrapped);

        info!("Run phase: {}", RunPhase::LoadingStations);
        let stations = self.load_stations().await?;

        info!("Run phase: {}", RunPhase::LoadingMeasurements);
        let measurement_files = self.load_measurements().await?;

        let report = IngestReport {
            stations,
            measurement_files,
            elapsed: started.elapsed(),
        };
        info!(
            "Run phase: {} ({} measurement rows in {:.1}s)",
            RunPhase::Done,
            report.measurement_totals().rows_written,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

    /// Retry backoff ends as soon as the run is cancelled.
    fn writer(&self) -> UpsertWriter {
        let retry = self
            .config
            .retry_policy()
            .with_cancellation(self.cancel.clone());
        UpsertWriter::new(Arc::clone(&self.store), retry)
    }

    fn file_context(&self) -> FileContext {
        FileContext {
            writer: self.writer(),
            batch_size: self.config.batch_size,
            cancel: self.cancel.clone(),
        }
    }

    /// Load the single station file; its batches are written one after another.
    pub async fn load_stations(&self) -> Result<FileReport> {
        let path = self.config.station_file();
        if !path.is_file() {
            return Err(ProcessingError::InvalidFormat(format!(
                "Station file not found: {}",
                path.display()
            )));
        }

        let report = load_file::<StationRecord>(path, self.file_context(), None).await?;
        info!(
            "Loaded {} stations ({} lines skipped)",
            report.rows_written, report.decode_failures
        );
        Ok(report)
    }

    /// Load every archive in the source directory on at most
    /// `max_concurrent_files` workers. Completion order across files is unspecified.
    pub async fn load_measurements(&self) -> Result<Vec<FileReport>> {
        let archives = discover_archives(&self.config.source_dir, &self.config.archive_extension)?;
        let worker_count = self.config.max_concurrent_files.max(1).min(archives.len());
        info!(
            "Loading {} archives with {} workers",
            archives.len(),
            worker_count
        );

        if let Some(progress) = &self.progress {
            progress.set_length(archives.len() as u64);
        }

        let (tx, rx) = mpsc::channel::<PathBuf>(archives.len().max(1));
        for path in archives {
            // Capacity covers every path, so this never waits
            tx.send(path)
                .await
                .map_err(|e| ProcessingError::InvalidFormat(e.to_string()))?;
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let filter = self.config.measurement_month.map(month_filter);
        let mut workers = JoinSet::new();

        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let ctx = self.file_context();
            let filter = filter.clone();
            let progress = self.progress.clone();

            workers.spawn(async move {
                let mut reports = Vec::new();
                loop {
                    if ctx.cancel.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().await.recv().await;
                    let Some(path) = next else { break };

                    debug!("Worker {} picked up {}", worker_id, path.display());
                    match load_file::<MeasurementRecord>(path, ctx.clone(), filter.clone()).await {
                        Ok(report) => {
                            if let Some(progress) = &progress {
                                progress.increment(1);
                                progress.set_message(&format!("Loaded {}", report.path.display()));
                            }
                            reports.push(report);
                        }
                        Err(e) => {
                            ctx.cancel.cancel();
                            return Err(e);
                        }
                    }
                }
                Ok(reports)
            });
        }

        let mut reports = Vec::new();
        let mut first_error: Option<ProcessingError> = None;

        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(ProcessingError::from).and_then(|r| r);
            match outcome {
                Ok(worker_reports) => reports.extend(worker_reports),
                Err(e) => {
                    self.cancel.cancel();
                    // A sibling stopping because of the cancel is not the root cause
                    let replace = match &first_error {
                        None => true,
                        Some(ProcessingError::Cancelled) => {
                            !matches!(e, ProcessingError::Cancelled)
                        }
                        Some(_) => false,
                    };
                    if replace {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if self.cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }

        Ok(reports)
    }
}

/// Read, decode, batch, deduplicate and merge one file, strictly in order.
///
/// Decoding runs on the blocking pool one batch at a time, so a worker never holds
/// more than the batch it is currently writing.
async fn load_file<R>(
    path: PathBuf,
    ctx: FileContext,
    filter: Option<RecordFilter<R>>,
) -> Result<FileReport>
where
    R: Record + DecodeLine,
{
    let started = Instant::now();
    let mut report = FileReport::new(path.clone());

    // Opening an archive extracts its whole entry, so skip that once cancelled
    if ctx.cancel.is_cancelled() {
        return Err(ProcessingError::Cancelled);
    }

    let open_path = path.clone();
    let source =
        tokio::task::spawn_blocking(move || LineSource::open(&open_path, R::KIND)).await??;
    let mut reader = RecordReader::<R>::new(source, ctx.batch_size).with_filter(filter);

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }

        let (returned, next) = tokio::task::spawn_blocking(move || {
            let next = reader.next();
            (reader, next)
        })
        .await?;
        reader = returned;

        let Some(batch) = next.transpose()? else { break };
        let index = batch.index;

        let deduped = deduplicate_batch(batch);
        report.duplicates_dropped += deduped.duplicates_dropped;

        let rows = ctx.writer.write(&deduped.batch).await.map_err(|source| {
            if source.is_cancelled() {
                return ProcessingError::Cancelled;
            }
            error!(
                "{}: {} batch {} failed: {}",
                path.display(),
                R::KIND,
                index,
                source
            );
            ProcessingError::Batch {
                file: path.clone(),
                batch: index,
                source,
            }
        })?;

        report.rows_written += rows;
        report.batches += 1;
    }

    report.apply_read_stats(reader.stats());
    info!(
        "{}: {} rows in {} batches ({} skipped, {} duplicates) in {:.1}s",
        path.display(),
        report.rows_written,
        report.batches,
        report.decode_failures,
        report.duplicates_dropped,
        started.elapsed().as_secs_f64()
    );

    Ok(report)
}
