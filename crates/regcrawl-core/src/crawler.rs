//! Per-region crawl state machine.
//!
//! ```text
//! Init --(trusted DONE)--------------------------------------> SkippedAlreadyDone
//!   |
//!   v
//! SessionSetup --(retries exhausted)-------------------------> SetupFailed
//!   |
//!   v
//! PageFetch --(no rows)--> Complete
//!   |                        ^
//!   v                        |
//! ItemLoop --> PageAdvance --(no enabled next control / any failure)
//!   ^              |
//!   +--(next)------+
//! ```
//!
//! Cancellation is observed between states, between items and during
//! politeness pauses; an interrupted region is never marked done.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::CrawlConfig;
use crate::error::AppError;
use crate::ledger::Ledger;
use crate::models::{ListingItem, Record, Region, parse_numeric_value};
use crate::progress::ProgressStore;
use crate::retry::RetryExhausted;
use crate::stats::Statistics;
use crate::traits::{PageDriver, WaitMode};

/// How a region visit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionOutcome {
    /// Marked done by an earlier run and backed by a non-empty ledger.
    AlreadyDone,
    /// Pagination finished; the region is now marked done.
    Completed { pages: u32, saved: u64 },
    /// The search session could not be established; left eligible for a
    /// future run.
    SetupFailed { attempts: u32, error: String },
    /// Cancellation observed before the region finished.
    Interrupted,
}

enum CrawlState {
    Init,
    SessionSetup,
    PageFetch,
    ItemLoop {
        items: Vec<ListingItem>,
        listing_url: Option<String>,
    },
    PageAdvance {
        listing_url: Option<String>,
    },
    Complete,
}

enum PageOutcome {
    Finished { saved: u64 },
    Interrupted,
}

/// Drives one region end-to-end against a [`PageDriver`].
pub struct RegionCrawler<'a, D: PageDriver> {
    driver: &'a D,
    ledger: &'a Ledger,
    config: &'a CrawlConfig,
}

impl<'a, D: PageDriver> RegionCrawler<'a, D> {
    pub fn new(driver: &'a D, ledger: &'a Ledger, config: &'a CrawlConfig) -> Self {
        Self {
            driver,
            ledger,
            config,
        }
    }

    /// Crawl `region`, committing records to the ledger as they are found.
    ///
    /// Only local persistence failures are returned as errors; every driver
    /// failure is absorbed into the outcome and `stats`.
    pub async fn crawl(
        &self,
        region: &Region,
        progress: &mut ProgressStore,
        stats: &mut Statistics,
        cancel: &CancellationToken,
    ) -> Result<RegionOutcome, AppError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut page: u32 = 0;
        let mut saved: u64 = 0;
        let mut state = CrawlState::Init;

        loop {
            state = match state {
                CrawlState::Init => {
                    if progress.is_done(&region.code) {
                        if self.ledger.has_data(region)? {
                            tracing::info!(region = %region.code, name = %region.name, "Already done, skipping");
                            return Ok(RegionOutcome::AlreadyDone);
                        }
                        tracing::info!(
                            region = %region.code,
                            name = %region.name,
                            "Marked done but ledger has no data, reprocessing"
                        );
                    }

                    seen.extend(self.ledger.load_ids(region)?);
                    if !seen.is_empty() {
                        tracing::info!(
                            region = %region.code,
                            existing = seen.len(),
                            "Existing records will be skipped"
                        );
                    }
                    CrawlState::SessionSetup
                }

                CrawlState::SessionSetup => {
                    // Nothing is persisted during setup, so it can be abandoned midway.
                    let setup = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ok(RegionOutcome::Interrupted),
                        result = self.setup_session(region) => result,
                    };
                    match setup {
                        Ok(()) => {
                            page = 1;
                            CrawlState::PageFetch
                        }
                        Err(exhausted) => {
                            tracing::error!(
                                region = %region.code,
                                attempts = exhausted.attempts,
                                error = %exhausted.last_error,
                                "Search session setup failed, skipping region"
                            );
                            stats.add_error();
                            return Ok(RegionOutcome::SetupFailed {
                                attempts: exhausted.attempts,
                                error: exhausted.last_error.to_string(),
                            });
                        }
                    }
                }

                CrawlState::PageFetch => {
                    if cancel.is_cancelled() {
                        return Ok(RegionOutcome::Interrupted);
                    }
                    tracing::info!(region = %region.code, page, "Processing page");
                    match self
                        .driver
                        .extract_listing_rows(&self.config.selectors.result_table)
                        .await
                    {
                        Ok(items) if items.is_empty() => {
                            tracing::info!(region = %region.code, page, "No rows, pagination finished");
                            CrawlState::Complete
                        }
                        Ok(items) => {
                            // Detail visits replace the listing in the shared tab.
                            let listing_url = match self.driver.current_url().await {
                                Ok(url) => Some(url),
                                Err(e) => {
                                    tracing::warn!(region = %region.code, page, error = %e, "Could not read listing URL");
                                    None
                                }
                            };
                            CrawlState::ItemLoop { items, listing_url }
                        }
                        Err(e) => {
                            tracing::warn!(region = %region.code, page, error = %e, "Listing extraction failed, ending pagination");
                            CrawlState::Complete
                        }
                    }
                }

                CrawlState::ItemLoop { items, listing_url } => {
                    match self
                        .process_page(region, page, &items, &mut seen, stats, cancel)
                        .await?
                    {
                        PageOutcome::Finished { saved: n } => {
                            saved += n;
                            CrawlState::PageAdvance { listing_url }
                        }
                        PageOutcome::Interrupted => return Ok(RegionOutcome::Interrupted),
                    }
                }

                CrawlState::PageAdvance { listing_url } => {
                    if cancel.is_cancelled() {
                        return Ok(RegionOutcome::Interrupted);
                    }
                    if self.advance_page(region, page, listing_url.as_deref()).await {
                        page += 1;
                        CrawlState::PageFetch
                    } else {
                        CrawlState::Complete
                    }
                }

                CrawlState::Complete => {
                    progress.mark_done(&region.code)?;
                    tracing::info!(region = %region.code, name = %region.name, pages = page, saved, "Region complete");
                    return Ok(RegionOutcome::Completed { pages: page, saved });
                }
            };
        }
    }

    /// Open the search form, select region and category, submit, and wait
    /// for results. The whole sequence is one retry unit.
    async fn setup_session(&self, region: &Region) -> Result<(), RetryExhausted> {
        let label = format!("session setup [{}]", region.code);
        self.config
            .setup_retry
            .run(&label, |attempt| async move {
                tracing::debug!(region = %region.code, attempt, "Setting up search session");
                self.run_setup_sequence(region).await
            })
            .await
    }

    async fn run_setup_sequence(&self, region: &Region) -> Result<(), AppError> {
        let selectors = &self.config.selectors;

        self.driver.navigate(&selectors.base_url).await?;
        self.driver
            .wait_for_element(
                &format!("#{}", selectors.region_field_id),
                WaitMode::Attached,
                self.config.element_timeout,
            )
            .await?;

        self.set_field(&selectors.region_field_id, &region.code)
            .await?;
        settle(self.config.field_settle_delay).await;

        self.set_field(&selectors.category_field_id, &selectors.category_value)
            .await?;
        settle(self.config.field_settle_delay).await;

        self.driver.click(&selectors.search_button).await?;
        self.driver
            .wait_for_element(
                &selectors.result_count,
                WaitMode::Visible,
                self.config.element_timeout,
            )
            .await?;

        tracing::info!(region = %region.code, name = %region.name, "Search session ready");
        Ok(())
    }

    /// Value injection with its own inner retry bound.
    async fn set_field(&self, element_id: &str, value: &str) -> Result<(), AppError> {
        self.config
            .field_retry
            .run(&format!("set #{element_id}"), |_| async move {
                self.driver.set_field_value(element_id, value).await
            })
            .await
            .map_err(|exhausted| exhausted.last_error)
    }

    async fn process_page(
        &self,
        region: &Region,
        page: u32,
        items: &[ListingItem],
        seen: &mut HashSet<String>,
        stats: &mut Statistics,
        cancel: &CancellationToken,
    ) -> Result<PageOutcome, AppError> {
        let mut saved = 0;

        for item in items {
            if cancel.is_cancelled() {
                return Ok(PageOutcome::Interrupted);
            }
            if seen.contains(&item.id) {
                tracing::debug!(region = %region.code, item = %item.id, "Already in ledger");
                stats.add_skip();
                continue;
            }

            match self.fetch_value(item).await {
                Ok(Some(value)) => {
                    let record = Record::from_item(item, region, Some(value));
                    self.ledger.append(region, &record)?;
                    seen.insert(item.id.clone());
                    stats.add_facility(&region.code, true);
                    saved += 1;
                    tracing::info!(
                        region = %region.code,
                        page,
                        item = %item.id,
                        name = %item.name,
                        value = record.value.as_deref().unwrap_or_default(),
                        "Record saved"
                    );
                }
                Ok(None) => {
                    stats.add_facility(&region.code, false);
                    tracing::debug!(region = %region.code, page, item = %item.id, "No value on detail page");
                }
                Err(e) => {
                    stats.add_error();
                    tracing::warn!(
                        region = %region.code,
                        page,
                        item = %item.id,
                        url = %item.detail_url,
                        error = %e,
                        "Detail fetch failed"
                    );
                }
            }

            if !self.config.politeness.pause(cancel).await {
                return Ok(PageOutcome::Interrupted);
            }
        }

        Ok(PageOutcome::Finished { saved })
    }

    /// Visit the detail page and parse its value, within the detail budget.
    ///
    /// `Ok(None)` means the page has no usable value.
    async fn fetch_value(&self, item: &ListingItem) -> Result<Option<String>, AppError> {
        let label = &self.config.selectors.value_label;
        let fetch = async {
            self.driver.navigate(&item.detail_url).await?;
            let text = self.driver.extract_labeled_field(label).await?;
            Ok::<_, AppError>(text.as_deref().and_then(parse_numeric_value))
        };

        tokio::time::timeout(self.config.detail_timeout, fetch)
            .await
            .map_err(|_| AppError::timeout("Detail fetch", self.config.detail_timeout))?
    }

    /// Return to the listing and follow an enabled "next" control.
    ///
    /// Every failure here means "no further pages".
    async fn advance_page(&self, region: &Region, page: u32, listing_url: Option<&str>) -> bool {
        let Some(listing_url) = listing_url else {
            tracing::warn!(region = %region.code, page, "No listing URL to return to, ending pagination");
            return false;
        };

        let advance = async {
            self.driver.navigate(listing_url).await?;
            self.driver
                .wait_for_element(
                    &self.config.selectors.result_table,
                    WaitMode::Visible,
                    self.config.element_timeout,
                )
                .await?;
            if !self.driver.has_next_page_control().await? {
                return Ok(false);
            }
            self.driver.click_next_page_control().await?;
            Ok::<_, AppError>(true)
        };

        match advance.await {
            Ok(true) => {
                settle(self.config.page_settle_delay).await;
                true
            }
            Ok(false) => {
                tracing::info!(region = %region.code, page, "Last page reached");
                false
            }
            Err(e) => {
                tracing::info!(region = %region.code, page, error = %e, "Pagination ended");
                false
            }
        }
    }
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
