use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use regcrawl_core::error::AppError;
use regcrawl_core::models::ListingItem;
use regcrawl_core::traits::{PageDriver, WaitMode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Resolves a selector to an element: XPath when prefixed with `xpath=`,
/// CSS otherwise.
const FIND_FN: &str = r#"
const __find = (sel) => {
  if (sel.startsWith('xpath=')) {
    return document.evaluate(sel.slice(6), document, null,
      XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
  }
  return document.querySelector(sel);
};
"#;

/// Launch settings for [`ChromiumDriver`].
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Budget for a single navigation.
    pub page_load_timeout: Duration,
    pub user_agent: String,
    pub window_size: (u32, u32),
    /// Link text of the listing's "next page" control.
    pub next_label: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            page_load_timeout: Duration::from_secs(20),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .into(),
            window_size: (1920, 1080),
            next_label: "次へ".into(),
        }
    }
}

/// [`PageDriver`] over a single Chromium tab, driven through the Chrome
/// DevTools Protocol.
///
/// Every DOM interaction is a small script evaluated in the page, so CSS and
/// XPath selectors share one code path.
///
/// # Example
///
/// ```rust,no_run
/// use regcrawl_client::{ChromiumDriver, LaunchOptions};
/// use regcrawl_core::traits::PageDriver;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = ChromiumDriver::launch(LaunchOptions::default()).await?;
/// driver.navigate("https://example.com").await?;
/// println!("{}", driver.current_url().await?);
/// driver.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    options: LaunchOptions,
}

impl ChromiumDriver {
    /// Launch Chromium and open the shared tab.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$CHROME_BIN`, one of
    /// the well-known install paths, or `chromiumoxide`'s own lookup.
    pub async fn launch(options: LaunchOptions) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .window_size(options.window_size.0, options.window_size.1);

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        let config = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-setuid-sandbox")
            .arg("--no-first-run")
            .arg("--ignore-certificate-errors")
            .build()
            .map_err(|e| AppError::DriverError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::DriverError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(driver_err("open tab"))?;
        page.set_user_agent(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await
            .map_err(driver_err("set user agent"))?;

        tracing::info!(headless = options.headless, "Browser ready");
        Ok(Self {
            browser,
            page,
            handler,
            options,
        })
    }

    /// Close the browser and stop the CDP handler.
    pub async fn close(mut self) -> Result<(), AppError> {
        let closed = self.browser.close().await.map_err(driver_err("close browser"));
        if closed.is_ok() {
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
        tracing::info!("Browser closed");
        closed.map(|_| ())
    }

    /// Evaluate `script` as an expression in the shared tab and deserialize
    /// its return value.
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, AppError> {
        let result = self
            .page
            .evaluate_expression(EvaluateParams::new(script))
            .await
            .map_err(driver_err("evaluate script"))?;
        Ok(result.into_value()?)
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// The snap wrapper at `/snap/bin/chromium` strips unknown CLI flags, so the
/// binary inside the snap is preferred. `None` leaves the lookup to
/// `chromiumoxide`.
fn find_chrome_binary() -> Option<PathBuf> {
    let candidates: &[&str] = &[
        // Snap (Ubuntu default)
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        // Flatpak
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        // Common apt / manual installs
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn driver_err(action: &'static str) -> impl Fn(CdpError) -> AppError {
    move |e| AppError::DriverError(format!("{action}: {e}"))
}

/// Quote `s` as a JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn probe_script(selector: &str, mode: WaitMode) -> String {
    let check = match mode {
        WaitMode::Attached => "return el !== null;",
        WaitMode::Visible => {
            "if (!el) return false; \
             const style = window.getComputedStyle(el); \
             return style.visibility !== 'hidden' && style.display !== 'none' \
                 && el.getClientRects().length > 0;"
        }
    };
    format!(
        "(() => {{ {FIND_FN} const el = __find({}); {check} }})()",
        js_str(selector)
    )
}

fn set_value_script(element_id: &str, value: &str) -> String {
    format!(
        "(() => {{
            const el = document.getElementById({});
            if (!el) return false;
            el.value = {};
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            return true;
        }})()",
        js_str(element_id),
        js_str(value)
    )
}

fn click_script(selector: &str) -> String {
    format!(
        "(() => {{ {FIND_FN} const el = __find({}); if (!el) return false; el.click(); return true; }})()",
        js_str(selector)
    )
}

/// Rows of at least three cells whose second cell links to a detail page.
fn listing_script(table_selector: &str) -> String {
    format!(
        "(() => {{
            {FIND_FN}
            const table = __find({});
            if (!table) return [];
            const items = [];
            for (const row of table.querySelectorAll('tbody tr')) {{
                const cols = row.querySelectorAll('td');
                if (cols.length < 3) continue;
                const link = cols[1].querySelector('a');
                if (!link || !link.href) continue;
                items.push({{
                    id: cols[0].innerText.trim(),
                    name: cols[1].innerText.trim(),
                    address: cols[2].innerText.trim(),
                    detail_url: link.href,
                }});
            }}
            return items;
        }})()",
        js_str(table_selector)
    )
}

/// Scripts return objects rather than bare `null`, which CDP reports as
/// "no value".
#[derive(Deserialize)]
struct LabeledCell {
    text: Option<String>,
}

/// Text of the first `td` following a `th` containing `label`.
fn labeled_field_script(label: &str) -> String {
    format!(
        "(() => {{
            const label = {};
            for (const th of document.querySelectorAll('th')) {{
                if (!th.textContent.includes(label)) continue;
                let cell = th.nextElementSibling;
                while (cell && cell.tagName !== 'TD') cell = cell.nextElementSibling;
                return {{ text: cell ? cell.innerText.trim() : null }};
            }}
            return {{ text: null }};
        }})()",
        js_str(label)
    )
}

/// `"missing"`, `"disabled"` or `"enabled"`; clicks the link when `click` is
/// set and it is enabled.
fn next_control_script(label: &str, click: bool) -> String {
    format!(
        "(() => {{
            const label = {};
            const link = Array.from(document.querySelectorAll('a'))
                .find((a) => a.textContent.includes(label));
            if (!link) return 'missing';
            const parent = link.parentElement;
            if ((parent && parent.classList.contains('disabled'))
                || link.classList.contains('disabled')
                || link.getAttribute('aria-disabled') === 'true') return 'disabled';
            if ({click}) link.click();
            return 'enabled';
        }})()",
        js_str(label)
    )
}

impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let timeout = self.options.page_load_timeout;
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(AppError::timeout(format!("Navigation to {url}"), timeout)),
        }
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        mode: WaitMode,
        timeout: Duration,
    ) -> Result<(), AppError> {
        let script = probe_script(selector, mode);
        let poll = async {
            loop {
                match self.eval::<bool>(script.clone()).await {
                    Ok(true) => return,
                    Ok(false) => {}
                    // Expected while the page is navigating.
                    Err(e) => tracing::trace!(%selector, error = %e, "Probe failed"),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| AppError::timeout(format!("Waiting for {selector}"), timeout))
    }

    async fn set_field_value(&self, element_id: &str, value: &str) -> Result<(), AppError> {
        if self.eval::<bool>(set_value_script(element_id, value)).await? {
            Ok(())
        } else {
            Err(AppError::ElementNotFound(format!("#{element_id}")))
        }
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        if self.eval::<bool>(click_script(selector)).await? {
            Ok(())
        } else {
            Err(AppError::ElementNotFound(selector.to_string()))
        }
    }

    async fn current_url(&self) -> Result<String, AppError> {
        self.page
            .url()
            .await
            .map_err(driver_err("read URL"))?
            .ok_or_else(|| AppError::DriverError("tab has no URL".into()))
    }

    async fn extract_listing_rows(
        &self,
        table_selector: &str,
    ) -> Result<Vec<ListingItem>, AppError> {
        self.eval(listing_script(table_selector)).await
    }

    async fn extract_labeled_field(&self, label: &str) -> Result<Option<String>, AppError> {
        let cell: LabeledCell = self.eval(labeled_field_script(label)).await?;
        Ok(cell.text)
    }

    async fn has_next_page_control(&self) -> Result<bool, AppError> {
        let state: String = self
            .eval(next_control_script(&self.options.next_label, false))
            .await?;
        Ok(state == "enabled")
    }

    async fn click_next_page_control(&self) -> Result<(), AppError> {
        let state: String = self
            .eval(next_control_script(&self.options.next_label, true))
            .await?;
        match state.as_str() {
            "enabled" => Ok(()),
            _ => Err(AppError::ElementNotFound(format!(
                "{} link ({state})",
                self.options.next_label
            ))),
        }
    }
}
