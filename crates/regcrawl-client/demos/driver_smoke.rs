/// Smoke-test for `ChromiumDriver`.
///
/// Launches a headless Chromium, opens the registry search form and checks
/// that the region selector is present.
///
/// Run with:
///   cargo run -p regcrawl-client --example driver_smoke
use std::time::Duration;

use regcrawl_client::{ChromiumDriver, LaunchOptions};
use regcrawl_core::SiteSelectors;
use regcrawl_core::traits::{PageDriver, WaitMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let selectors = SiteSelectors::default();

    println!("Launching headless browser…");
    let driver = ChromiumDriver::launch(LaunchOptions::default()).await?;

    println!("Opening {} …", selectors.base_url);
    let result = async {
        driver.navigate(&selectors.base_url).await?;
        driver
            .wait_for_element(
                &format!("#{}", selectors.region_field_id),
                WaitMode::Attached,
                Duration::from_secs(10),
            )
            .await?;
        driver.current_url().await
    }
    .await;

    driver.close().await?;
    let url = result?;
    println!("OK, search form loaded at {url}");
    Ok(())
}
