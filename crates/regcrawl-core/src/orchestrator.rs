use tokio_util::sync::CancellationToken;

use crate::config::CrawlConfig;
use crate::crawler::{RegionCrawler, RegionOutcome};
use crate::error::AppError;
use crate::ledger::Ledger;
use crate::models::Region;
use crate::progress::{CompletionRatio, ProgressStore};
use crate::stats::Statistics;
use crate::traits::PageDriver;

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    RunStarted {
        regions: usize,
        ratio: CompletionRatio,
    },
    RegionStarted {
        region: &'a Region,
    },
    RegionSkipped {
        region: &'a Region,
    },
    RegionSetupFailed {
        region: &'a Region,
        attempts: u32,
        error: &'a str,
    },
    RegionCompleted {
        region: &'a Region,
        pages: u32,
        saved: u64,
    },
    RegionInterrupted {
        region: &'a Region,
    },
    Progress {
        ratio: CompletionRatio,
    },
    RunFinished {
        interrupted: bool,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl CrawlReporter for TracingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::RunStarted { regions, ratio } => {
                tracing::info!(regions, progress = %ratio, "Crawl started");
            }
            CrawlEvent::RegionStarted { region } => {
                tracing::info!(region = %region.code, name = %region.name, "Region started");
            }
            CrawlEvent::RegionSkipped { region } => {
                tracing::info!(region = %region.code, name = %region.name, "Region already done");
            }
            CrawlEvent::RegionSetupFailed {
                region,
                attempts,
                error,
            } => {
                tracing::error!(
                    region = %region.code,
                    name = %region.name,
                    attempts,
                    %error,
                    "Region skipped after setup failures"
                );
            }
            CrawlEvent::RegionCompleted {
                region,
                pages,
                saved,
            } => {
                tracing::info!(region = %region.code, name = %region.name, pages, saved, "Region completed");
            }
            CrawlEvent::RegionInterrupted { region } => {
                tracing::warn!(region = %region.code, name = %region.name, "Region interrupted");
            }
            CrawlEvent::Progress { ratio } => {
                tracing::info!(
                    completed = ratio.completed,
                    total = ratio.total,
                    "Progress: {ratio}"
                );
            }
            CrawlEvent::RunFinished { interrupted } => {
                tracing::info!(interrupted, "Crawl finished");
            }
        }
    }
}

/// Region outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub already_done: usize,
    pub setup_failed: usize,
    pub interrupted: bool,
}

/// Walks the region list once, in order, one region at a time.
pub struct Orchestrator<'a, D: PageDriver> {
    driver: &'a D,
    config: CrawlConfig,
    regions: Vec<Region>,
    total_regions: usize,
    ledger: Ledger,
    progress: ProgressStore,
}

impl<'a, D: PageDriver> Orchestrator<'a, D> {
    /// Validate `config` and load the progress store under its output dir.
    pub fn new(driver: &'a D, config: CrawlConfig, regions: Vec<Region>) -> Result<Self, AppError> {
        config.validate()?;
        let ledger = Ledger::new(config.ledger_dir());
        let progress = ProgressStore::open(config.progress_path())?;
        let total_regions = regions.len();
        Ok(Self {
            driver,
            config,
            regions,
            total_regions,
            ledger,
            progress,
        })
    }

    /// Denominator of the completion ratio, when `regions` is a filtered
    /// subset of a larger table.
    pub fn with_total_regions(mut self, total: usize) -> Self {
        self.total_regions = total;
        self
    }

    pub fn completion_ratio(&self) -> CompletionRatio {
        self.progress.completion_ratio(self.total_regions)
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Crawl every region once.
    ///
    /// Stops early on cancellation. A region that fails setup is left for the
    /// next run and does not stop the others. Only local persistence errors
    /// abort the run.
    pub async fn run<R: CrawlReporter>(
        &mut self,
        stats: &mut Statistics,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary::default();
        reporter.report(CrawlEvent::RunStarted {
            regions: self.regions.len(),
            ratio: self.completion_ratio(),
        });

        let crawler = RegionCrawler::new(self.driver, &self.ledger, &self.config);

        for region in &self.regions {
            if cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            reporter.report(CrawlEvent::RegionStarted { region });
            let outcome = crawler
                .crawl(region, &mut self.progress, stats, cancel)
                .await?;

            match &outcome {
                RegionOutcome::AlreadyDone => {
                    summary.already_done += 1;
                    reporter.report(CrawlEvent::RegionSkipped { region });
                }
                RegionOutcome::Completed { pages, saved } => {
                    summary.completed += 1;
                    reporter.report(CrawlEvent::RegionCompleted {
                        region,
                        pages: *pages,
                        saved: *saved,
                    });
                }
                RegionOutcome::SetupFailed { attempts, error } => {
                    summary.setup_failed += 1;
                    reporter.report(CrawlEvent::RegionSetupFailed {
                        region,
                        attempts: *attempts,
                        error,
                    });
                }
                RegionOutcome::Interrupted => {
                    summary.interrupted = true;
                    reporter.report(CrawlEvent::RegionInterrupted { region });
                }
            }

            reporter.report(CrawlEvent::Progress {
                ratio: self.progress.completion_ratio(self.total_regions),
            });

            if summary.interrupted {
                break;
            }
        }

        reporter.report(CrawlEvent::RunFinished {
            interrupted: summary.interrupted,
        });
        Ok(summary)
    }
}
