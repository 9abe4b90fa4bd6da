use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::models::ListingItem;

/// How an element must exist before [`PageDriver::wait_for_element`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Present in the DOM and rendered with a layout box.
    Visible,
    /// Present in the DOM, rendered or not.
    Attached,
}

/// Page automation capability consumed by the crawl engine.
///
/// All calls act on a single shared tab and are awaited strictly in sequence.
/// Selectors are CSS selectors, or XPath expressions when prefixed with
/// `xpath=`. Any method may fail transiently; the engine decides what a
/// failure means at each call site.
pub trait PageDriver: Send + Sync {
    /// Load `url` in the shared tab and wait for the load to settle.
    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Poll until `selector` matches according to `mode`, or fail with
    /// [`AppError::Timeout`] after `timeout`.
    fn wait_for_element(
        &self,
        selector: &str,
        mode: WaitMode,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Inject `value` into the form control with DOM id `element_id` and fire
    /// its `input`/`change` events.
    fn set_field_value(
        &self,
        element_id: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn click(&self, selector: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Read the result listing rows. Rows without a detail link are omitted.
    fn extract_listing_rows(
        &self,
        table_selector: &str,
    ) -> impl Future<Output = Result<Vec<ListingItem>, AppError>> + Send;

    /// Text of the cell labelled `label` on a detail page; `None` when the
    /// page has no such label.
    fn extract_labeled_field(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Whether the listing shows an enabled "next page" control.
    fn has_next_page_control(&self) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn click_next_page_control(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}
