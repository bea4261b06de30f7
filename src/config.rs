//! Ingestion settings.

use clap::ValueEnum;
use std::time::Duration;

/// Per-lookup pause matching the catalog's published rate limit.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(50);

/// What to do with a chart date whose rows hit transient lookup failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Commit resolved rows but leave the date unprocessed so the next run retries it.
    #[default]
    Defer,
    /// Commit and mark processed; the failed rows are dropped.
    Accept,
    /// Commit nothing for the date and stop the run.
    Abort,
}

#[derive(Clone, Debug)]
pub struct IngestConfig {
    /// Pause after every catalog lookup, retries included.
    pub rate_limit_delay: Duration,
    /// Extra attempts for a row whose lookup failed.
    pub lookup_retries: u32,
    pub failure_policy: FailurePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            lookup_retries: 0,
            failure_policy: FailurePolicy::Defer,
        }
    }
}

impl IngestConfig {
    /// No pacing, no retries. For tests and offline catalogs.
    pub fn unthrottled() -> Self {
        Self {
            rate_limit_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
