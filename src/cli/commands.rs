use crate::archive::{discover_archives, populate_if_empty, HttpIndexSource, RemoteSource};
use crate::cli::args::{Cli, Commands, KindArg, SourceOverrides};
use crate::config::IngestConfig;
use crate::models::{MeasurementRecord, Record, RecordKind, StationRecord};
use crate::processors::{deduplicate_batch, IngestPipeline};
use crate::readers::{DecodeLine, LineSource, RecordReader};
use crate::utils::progress::ProgressReporter;
use crate::writers::{InMemoryStore, PostgresStore, RecordStore, UpsertWriter};
use anyhow::{bail, Context, Result};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Load {
            source,
            max_workers,
            batch_size,
            month,
            dry_run,
            quiet,
        } => {
            let mut config = IngestConfig::load(cli.config.as_deref())?;
            apply_overrides(&mut config, &source);
            if let Some(workers) = max_workers {
                config.max_concurrent_files = workers;
            }
            if let Some(size) = batch_size {
                config.batch_size = size;
            }
            if month.is_some() {
                config.measurement_month = month;
            }
            config.validate().context("Invalid configuration")?;

            load(config, dry_run, quiet).await?;
        }

        Commands::Bootstrap { source } => {
            let config = resolve_config(cli.config.as_deref(), &source)?;
            let store = PostgresStore::connect(&config.database_url, config.pool_size)?;
            UpsertWriter::new(Arc::new(store), config.retry_policy())
                .bootstrap()
                .await?;
            println!("Schema ready");
        }

        Commands::Inspect {
            source,
            file,
            kind,
            sample,
        } => {
            let config = resolve_config(cli.config.as_deref(), &source)?;
            tokio::task::spawn_blocking(move || match file {
                Some(path) => {
                    let kind = kind
                        .map(RecordKind::from)
                        .unwrap_or_else(|| kind_from_extension(&path, &config.archive_extension));
                    inspect_file(&path, kind, config.batch_size, sample)
                }
                None => inspect(&config, sample),
            })
            .await??;
        }

        Commands::Fetch { source, base_url } => {
            let config = resolve_config(cli.config.as_deref(), &source)?;
            let Some(url) = base_url.or(config.remote.base_url.clone()) else {
                bail!("No remote base URL configured");
            };
            let remote = HttpIndexSource::new(&url)?;
            let fetched = populate_if_empty(&config.source_dir, &remote).await?;
            println!(
                "Fetched {} files into {}",
                fetched,
                config.source_dir.display()
            );
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut IngestConfig, source: &SourceOverrides) {
    if let Some(dir) = &source.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(url) = &source.database_url {
        config.database_url = url.clone();
    }
}

fn resolve_config(config_file: Option<&Path>, source: &SourceOverrides) -> Result<IngestConfig> {
    let mut config = IngestConfig::load(config_file)?;
    apply_overrides(&mut config, source);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn load(config: IngestConfig, dry_run: bool, quiet: bool) -> Result<()> {
    println!("Loading DWD data from {}", config.source_dir.display());
    println!(
        "Workers: {}, Batch size: {}",
        config.max_concurrent_files, config.batch_size
    );

    let memory = Arc::new(InMemoryStore::new());
    let store: Arc<dyn RecordStore> = if dry_run {
        println!("Dry run: records are kept in memory only");
        memory.clone()
    } else {
        Arc::new(
            PostgresStore::connect(&config.database_url, config.pool_size)
                .context("Failed to set up the database pool")?,
        )
    };

    let remote: Option<Arc<dyn RemoteSource>> = match &config.remote.base_url {
        Some(url) => {
            let remote: Arc<dyn RemoteSource> = Arc::new(HttpIndexSource::new(url)?);
            Some(remote)
        }
        None => None,
    };

    let progress = Arc::new(ProgressReporter::new(0, "Loading archives", quiet));
    let mut pipeline = IngestPipeline::new(config, store).with_progress(Arc::clone(&progress));
    if let Some(remote) = remote {
        pipeline = pipeline.with_remote(remote);
    }

    let cancel = pipeline.cancellation_token();
    spawn_interrupt_handler(cancel.clone());

    match pipeline.run().await {
        Ok(report) => {
            progress.finish_with_message("Load complete");
            println!("\n{}", report.summary());
            if dry_run {
                println!(
                    "In memory: {} stations, {} measurements",
                    memory.station_count(),
                    memory.measurement_count()
                );
            }
            Ok(())
        }
        Err(e) => {
            if cancel.is_cancelled() {
                warn!("Run stopped before completion");
            }
            Err(e).context("Load failed")
        }
    }
}

/// First Ctrl-C stops new batches from starting; in-flight merges still finish.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight batches");
            cancel.cancel();
        }
    });
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Station => RecordKind::Station,
            KindArg::Measurement => RecordKind::Measurement,
        }
    }
}

fn kind_from_extension(path: &Path, archive_extension: &str) -> RecordKind {
    let is_archive = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(archive_extension));
    if is_archive {
        RecordKind::Measurement
    } else {
        RecordKind::Station
    }
}

fn inspect(config: &IngestConfig, sample: usize) -> Result<()> {
    let station_file = config.station_file();
    if station_file.is_file() {
        inspect_file(&station_file, RecordKind::Station, config.batch_size, sample)?;
    } else {
        println!("No station file at {}", station_file.display());
    }

    let archives = discover_archives(&config.source_dir, &config.archive_extension)?;
    println!("\n{} archives found", archives.len());
    for path in archives {
        inspect_file(&path, RecordKind::Measurement, config.batch_size, sample)?;
    }

    Ok(())
}

fn inspect_file(path: &Path, kind: RecordKind, batch_size: usize, sample: usize) -> Result<()> {
    let source = LineSource::open(path, kind)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    match kind {
        RecordKind::Station => inspect_source::<StationRecord>(source, batch_size, sample),
        RecordKind::Measurement => inspect_source::<MeasurementRecord>(source, batch_size, sample),
    }
}

fn inspect_source<R>(source: LineSource, batch_size: usize, sample: usize) -> Result<()>
where
    R: Record + DecodeLine + Debug,
{
    let path: PathBuf = source.path().to_path_buf();
    let mut reader = RecordReader::<R>::new(source, batch_size);
    let mut shown = 0;
    let mut duplicates = 0;

    println!("\n{} ({})", path.display(), R::KIND);
    for batch in reader.by_ref() {
        let deduped = deduplicate_batch(batch?);
        duplicates += deduped.duplicates_dropped;
        for record in deduped.batch.records.iter().take(sample.saturating_sub(shown)) {
            println!("  {:?}", record);
            shown += 1;
        }
    }

    let stats = reader.stats();
    println!(
        "  lines: {}, decoded: {}, skipped: {}, duplicates: {}",
        stats.lines, stats.decoded, stats.decode_failures, duplicates
    );
    Ok(())
}

fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    use std::sync::Mutex;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dwd_ingest={}", log_level)));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    debug!("Logging initialized at level: {}", log_level);
    info!("dwd-ingest {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
