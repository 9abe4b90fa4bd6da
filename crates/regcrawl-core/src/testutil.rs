//! Test utilities: a scriptable in-memory registry behind [`PageDriver`].
//!
//! Handwritten mock for dependency injection in unit tests. State lives in
//! `Arc<Mutex<_>>` so a test can keep a clone for assertions on recorded
//! calls while the crawler borrows the driver.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{CrawlConfig, SiteSelectors};
use crate::error::AppError;
use crate::models::ListingItem;
use crate::orchestrator::{CrawlEvent, CrawlReporter};
use crate::politeness::Politeness;
use crate::retry::RetryPolicy;
use crate::traits::{PageDriver, WaitMode};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A listing row whose detail page lives at `mock://detail/<id>`.
pub fn item(id: &str) -> ListingItem {
    ListingItem::new(
        id,
        format!("Facility {id}"),
        format!("{id} Chome, Test City"),
        detail_url(id),
    )
}

pub fn detail_url(id: &str) -> String {
    format!("mock://detail/{id}")
}

/// Default config with every delay zeroed and short timeouts.
pub fn fast_config(output_dir: &Path) -> CrawlConfig {
    CrawlConfig::default()
        .with_output_dir(output_dir)
        .with_setup_retry(RetryPolicy::fixed(3, Duration::ZERO))
        .with_field_retry(RetryPolicy::fixed(2, Duration::ZERO))
        .with_politeness(Politeness::new(Duration::ZERO, Duration::ZERO))
        .with_settle_delays(Duration::ZERO, Duration::ZERO)
        .with_element_timeout(Duration::from_millis(200))
        .with_detail_timeout(Duration::from_millis(500))
}

// ---------------------------------------------------------------------------
// MockDriver
// ---------------------------------------------------------------------------

/// How a detail page behaves when visited.
#[derive(Debug, Clone)]
pub enum DetailResponse {
    /// The labelled cell exists with this text.
    Value(String),
    /// The page has no labelled cell.
    Missing,
    /// Navigation to the page fails.
    NavigationFails,
    /// Navigation succeeds but reading the page fails.
    ExtractionFails,
    /// Navigation never completes.
    Hangs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Blank,
    SearchForm,
    Listing { region: String, page: usize },
    Detail(String),
}

struct MockState {
    selectors: SiteSelectors,
    listings: HashMap<String, Vec<Vec<ListingItem>>>,
    details: HashMap<String, DetailResponse>,
    /// Remaining result-count waits that time out, per region.
    setup_failures: HashMap<String, u32>,
    next_check_fails: bool,
    /// Tokens cancelled when the keyed detail URL is visited.
    cancel_on_visit: HashMap<String, CancellationToken>,
    selected_region: Option<String>,
    location: Location,
    calls: Vec<String>,
}

/// In-memory registry: a search form, per-region paginated listings and
/// detail pages.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Registry with no listings; uses the default selectors.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                selectors: SiteSelectors::default(),
                listings: HashMap::new(),
                details: HashMap::new(),
                setup_failures: HashMap::new(),
                next_check_fails: false,
                cancel_on_visit: HashMap::new(),
                selected_region: None,
                location: Location::Blank,
                calls: Vec::new(),
            })),
        }
    }

    /// Result pages for `region_code`, in traversal order.
    pub fn with_listing(self, region_code: &str, pages: Vec<Vec<ListingItem>>) -> Self {
        self.state
            .lock()
            .unwrap()
            .listings
            .insert(region_code.to_string(), pages);
        self
    }

    pub fn with_detail(self, id: &str, response: DetailResponse) -> Self {
        self.state
            .lock()
            .unwrap()
            .details
            .insert(detail_url(id), response);
        self
    }

    /// Shorthand for `with_detail(id, DetailResponse::Value(value))`.
    pub fn with_value(self, id: &str, value: &str) -> Self {
        self.with_detail(id, DetailResponse::Value(value.to_string()))
    }

    /// The first `failures` searches for `region_code` never show results.
    pub fn with_setup_failures(self, region_code: &str, failures: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .setup_failures
            .insert(region_code.to_string(), failures);
        self
    }

    /// Checking for a next-page control always errors.
    pub fn with_failing_next_check(self) -> Self {
        self.state.lock().unwrap().next_check_fails = true;
        self
    }

    /// Visiting the detail page of `id` cancels `token`, as a Ctrl-C
    /// arriving mid-fetch would.
    pub fn with_cancel_on_visit(self, id: &str, token: CancellationToken) -> Self {
        self.state
            .lock()
            .unwrap()
            .cancel_on_visit
            .insert(detail_url(id), token);
        self
    }

    /// Every driver call so far, e.g. `"nav:mock://detail/A2"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn listing_url(region: &str, page: usize) -> String {
    format!("mock://listing/{region}/{page}")
}

fn parse_listing_url(url: &str) -> Option<(String, usize)> {
    let rest = url.strip_prefix("mock://listing/")?;
    let (region, page) = rest.split_once('/')?;
    Some((region.to_string(), page.parse().ok()?))
}

impl PageDriver for MockDriver {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.record(format!("nav:{url}"));
        let response = {
            let mut state = self.state.lock().unwrap();
            if let Some(token) = state.cancel_on_visit.get(url) {
                token.cancel();
            }
            let response = state.details.get(url).cloned();
            match &response {
                Some(DetailResponse::NavigationFails) | Some(DetailResponse::Hangs) => {}
                _ if url.starts_with("mock://detail/") => {
                    state.location = Location::Detail(url.to_string());
                }
                _ => {
                    if let Some((region, page)) = parse_listing_url(url) {
                        state.location = Location::Listing { region, page };
                    } else {
                        state.location = Location::SearchForm;
                        state.selected_region = None;
                    }
                }
            }
            response
        };

        match response {
            Some(DetailResponse::NavigationFails) => Err(AppError::NavigationError {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".into(),
            }),
            Some(DetailResponse::Hangs) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        _mode: WaitMode,
        timeout: Duration,
    ) -> Result<(), AppError> {
        self.record(format!("wait:{selector}"));
        let mut state = self.state.lock().unwrap();

        if selector == state.selectors.result_count {
            let region = state.selected_region.clone().unwrap_or_default();
            if let Some(remaining) = state.setup_failures.get_mut(&region)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(AppError::timeout(format!("wait {selector}"), timeout));
            }
        }

        let present = match &state.location {
            Location::Blank | Location::Detail(_) => false,
            Location::SearchForm => {
                selector.contains(state.selectors.region_field_id.as_str())
                    || selector.contains(state.selectors.category_field_id.as_str())
            }
            Location::Listing { .. } => {
                selector == state.selectors.result_count || selector == state.selectors.result_table
            }
        };
        if present {
            Ok(())
        } else {
            Err(AppError::timeout(format!("wait {selector}"), timeout))
        }
    }

    async fn set_field_value(&self, element_id: &str, value: &str) -> Result<(), AppError> {
        self.record(format!("set:{element_id}={value}"));
        let mut state = self.state.lock().unwrap();
        if state.location != Location::SearchForm {
            return Err(AppError::ElementNotFound(format!("#{element_id}")));
        }
        if element_id == state.selectors.region_field_id {
            state.selected_region = Some(value.to_string());
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        self.record(format!("click:{selector}"));
        let mut state = self.state.lock().unwrap();
        let on_form = state.location == Location::SearchForm;
        let is_search = selector == state.selectors.search_button;
        match state.selected_region.clone() {
            Some(region) if on_form && is_search => {
                state.location = Location::Listing { region, page: 0 };
                Ok(())
            }
            _ => Err(AppError::ElementNotFound(selector.to_string())),
        }
    }

    async fn current_url(&self) -> Result<String, AppError> {
        self.record("url".into());
        let state = self.state.lock().unwrap();
        Ok(match &state.location {
            Location::Blank => "about:blank".to_string(),
            Location::SearchForm => state.selectors.base_url.clone(),
            Location::Listing { region, page } => listing_url(region, *page),
            Location::Detail(url) => url.clone(),
        })
    }

    async fn extract_listing_rows(
        &self,
        table_selector: &str,
    ) -> Result<Vec<ListingItem>, AppError> {
        self.record(format!("rows:{table_selector}"));
        let state = self.state.lock().unwrap();
        match &state.location {
            Location::Listing { region, page } => Ok(state
                .listings
                .get(region)
                .and_then(|pages| pages.get(*page))
                .cloned()
                .unwrap_or_default()),
            _ => Ok(Vec::new()),
        }
    }

    async fn extract_labeled_field(&self, label: &str) -> Result<Option<String>, AppError> {
        self.record(format!("field:{label}"));
        let state = self.state.lock().unwrap();
        let Location::Detail(url) = &state.location else {
            return Ok(None);
        };
        match state.details.get(url) {
            Some(DetailResponse::Value(text)) => Ok(Some(text.clone())),
            Some(DetailResponse::ExtractionFails) => {
                Err(AppError::DriverError("execution context destroyed".into()))
            }
            _ => Ok(None),
        }
    }

    async fn has_next_page_control(&self) -> Result<bool, AppError> {
        self.record("has_next".into());
        let state = self.state.lock().unwrap();
        if state.next_check_fails {
            return Err(AppError::DriverError("stale element reference".into()));
        }
        match &state.location {
            Location::Listing { region, page } => Ok(state
                .listings
                .get(region)
                .is_some_and(|pages| page + 1 < pages.len())),
            _ => Ok(false),
        }
    }

    async fn click_next_page_control(&self) -> Result<(), AppError> {
        self.record("next".into());
        let mut state = self.state.lock().unwrap();
        let next = match &state.location {
            Location::Listing { region, page } => Location::Listing {
                region: region.clone(),
                page: page + 1,
            },
            _ => return Err(AppError::ElementNotFound("next page control".into())),
        };
        state.location = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps a short description of every event.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl CrawlReporter for RecordingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let line = match event {
            CrawlEvent::RunStarted { regions, .. } => format!("run_started:{regions}"),
            CrawlEvent::RegionStarted { region } => format!("started:{}", region.code),
            CrawlEvent::RegionSkipped { region } => format!("skipped:{}", region.code),
            CrawlEvent::RegionSetupFailed { region, .. } => format!("setup_failed:{}", region.code),
            CrawlEvent::RegionCompleted { region, saved, .. } => {
                format!("completed:{}:{saved}", region.code)
            }
            CrawlEvent::RegionInterrupted { region } => format!("interrupted:{}", region.code),
            CrawlEvent::Progress { ratio } => format!("progress:{}", ratio.completed),
            CrawlEvent::RunFinished { interrupted } => format!("run_finished:{interrupted}"),
        };
        self.events.lock().unwrap().push(line);
    }
}
