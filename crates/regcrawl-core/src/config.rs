use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::politeness::Politeness;
use crate::retry::RetryPolicy;

/// Selectors and fixed form values of the target registry.
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Search form entry point.
    pub base_url: String,
    /// DOM id of the region `<select>`.
    pub region_field_id: String,
    /// DOM id of the facility category `<select>`.
    pub category_field_id: String,
    /// Category submitted with every search ("5" = pharmacy).
    pub category_value: String,
    pub search_button: String,
    /// Appears once a search has produced a result listing.
    pub result_count: String,
    pub result_table: String,
    /// Header text of the detail-page cell holding the numeric value.
    pub value_label: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            base_url: "https://www.iryou.teikyouseido.mhlw.go.jp/znk-web/juminkanja/S2300/initialize"
                .into(),
            region_field_id: "todofukenCd".into(),
            category_field_id: "iryoKikanShubetsuCd".into(),
            category_value: "5".into(),
            search_button: "xpath=//button[contains(text(), '検索')]".into(),
            result_count: ".result-count".into(),
            result_table: "table.result-table".into(),
            value_label: "総取扱処方箋数".into(),
        }
    }
}

/// Configuration for a crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Directory holding ledgers, `progress.json`, `statistics.json` and the log.
    pub output_dir: PathBuf,
    pub selectors: SiteSelectors,
    /// Whole session-setup sequence.
    pub setup_retry: RetryPolicy,
    /// A single form value injection, nested inside a setup attempt.
    pub field_retry: RetryPolicy,
    pub politeness: Politeness,
    /// Waiting for a selector to appear.
    pub element_timeout: Duration,
    /// A single navigation (enforced by the driver).
    pub page_load_timeout: Duration,
    /// Navigating to a detail page and reading its value, end to end.
    pub detail_timeout: Duration,
    /// Pause after injecting a form value, letting dependent fields refresh.
    pub field_settle_delay: Duration,
    /// Pause after clicking "next page".
    pub page_settle_delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("registry_data"),
            selectors: SiteSelectors::default(),
            setup_retry: RetryPolicy::fixed(3, Duration::from_secs(3)),
            field_retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
            politeness: Politeness::default(),
            element_timeout: Duration::from_secs(10),
            page_load_timeout: Duration::from_secs(20),
            detail_timeout: Duration::from_secs(30),
            field_settle_delay: Duration::from_secs(1),
            page_settle_delay: Duration::from_secs(3),
        }
    }
}

impl CrawlConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_selectors(mut self, selectors: SiteSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_setup_attempts(mut self, attempts: u32) -> Self {
        self.setup_retry.max_attempts = attempts;
        self
    }

    pub fn with_setup_retry(mut self, policy: RetryPolicy) -> Self {
        self.setup_retry = policy;
        self
    }

    pub fn with_field_retry(mut self, policy: RetryPolicy) -> Self {
        self.field_retry = policy;
        self
    }

    pub fn with_politeness(mut self, politeness: Politeness) -> Self {
        self.politeness = politeness;
        self
    }

    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }

    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Self {
        self.page_load_timeout = timeout;
        self
    }

    pub fn with_detail_timeout(mut self, timeout: Duration) -> Self {
        self.detail_timeout = timeout;
        self
    }

    pub fn with_settle_delays(mut self, field: Duration, page: Duration) -> Self {
        self.field_settle_delay = field;
        self.page_settle_delay = page;
        self
    }

    pub fn ledger_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn progress_path(&self) -> PathBuf {
        self.output_dir.join("progress.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.output_dir.join("statistics.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join("crawler.log")
    }

    /// Reject settings the crawler cannot honour.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.setup_retry.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "setup attempts must be at least 1".into(),
            ));
        }
        if self.field_retry.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "field attempts must be at least 1".into(),
            ));
        }
        if self.politeness.min_wait > self.politeness.max_wait {
            return Err(AppError::ConfigError(format!(
                "min wait {:?} exceeds max wait {:?}",
                self.politeness.min_wait, self.politeness.max_wait
            )));
        }
        for (name, timeout) in [
            ("element timeout", self.element_timeout),
            ("page load timeout", self.page_load_timeout),
            ("detail timeout", self.detail_timeout),
        ] {
            if timeout.is_zero() {
                return Err(AppError::ConfigError(format!("{name} must be non-zero")));
            }
        }
        if self.selectors.base_url.trim().is_empty() {
            return Err(AppError::ConfigError("base URL must be set".into()));
        }
        Ok(())
    }
}
