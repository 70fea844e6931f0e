pub mod deduplicator;
pub mod pipeline;
pub mod report;
pub mod retry;

pub use deduplicator::{deduplicate_batch, deduplicate_first_wins, Deduplicated};
pub use pipeline::{month_filter, IngestPipeline, RunPhase};
pub use report::{FileReport, IngestReport};
pub use retry::RetryPolicy;
