pub mod chromium_driver;

pub use chromium_driver::{ChromiumDriver, LaunchOptions};
