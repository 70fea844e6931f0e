/// File names
pub const DEFAULT_STATION_FILE: &str = "zehn_min_tu_Beschreibung_Stationen.txt";
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "zip";
pub const MEASUREMENT_ENTRY_PREFIX: &str = "produkt_";

/// Directory names
pub const DEFAULT_SOURCE_DIR: &str = "data";

/// Source format
pub const STATION_HEADER_LINES: usize = 2;
pub const MEASUREMENT_HEADER_LINES: usize = 1;
pub const MEASUREMENT_MIN_FIELDS: usize = 8;
pub const MISSING_VALUE_SENTINEL: &str = "-999";

/// Processing defaults
pub const DEFAULT_BATCH_SIZE: usize = 80_000;
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 5;
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB

/// Retry defaults
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 20_000;

/// Decode failures logged at warn level per file before dropping to debug
pub const MAX_LOGGED_DECODE_FAILURES: usize = 10;

/// Configuration
pub const ENV_PREFIX: &str = "DWD_INGEST";

/// Prefix of staged remote downloads, renamed into place once complete
pub const PARTIAL_DOWNLOAD_PREFIX: &str = ".partial-";
