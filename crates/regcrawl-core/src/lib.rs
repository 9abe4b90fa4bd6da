pub mod config;
pub mod crawler;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod politeness;
pub mod progress;
pub mod regions;
pub mod retry;
pub mod stats;
pub mod traits;

#[cfg(test)]
pub mod testutil;

pub use config::{CrawlConfig, SiteSelectors};
pub use crawler::{RegionCrawler, RegionOutcome};
pub use error::AppError;
pub use ledger::Ledger;
pub use models::{ListingItem, Record, Region, parse_numeric_value};
pub use orchestrator::{CrawlEvent, CrawlReporter, Orchestrator, RunSummary, TracingReporter};
pub use politeness::Politeness;
pub use progress::{CompletionRatio, ProgressStore};
pub use regions::{default_regions, select_regions};
pub use retry::{Backoff, RetryExhausted, RetryPolicy};
pub use stats::{Statistics, StatsSnapshot};
pub use traits::{PageDriver, WaitMode};
