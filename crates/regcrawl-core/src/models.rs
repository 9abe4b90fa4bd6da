use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// An administrative region, the outer iteration unit of a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Two-digit code submitted to the registry search form (e.g., "13")
    pub code: String,
    /// Display name (e.g., "東京都")
    pub name: String,
}

impl Region {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// One row of a search result listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    pub id: String,
    pub name: String,
    pub address: String,
    pub detail_url: String,
}

impl ListingItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        detail_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            detail_url: detail_url.into(),
        }
    }
}

/// A persisted ledger row.
///
/// Field order is the ledger column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub address: String,
    pub value: Option<String>,
    /// Region display name
    pub region: String,
    #[serde(rename = "scrapedAt")]
    pub scraped_at: DateTime<Utc>,
}

impl Record {
    /// Build a record for a listing item observed in `region` right now.
    pub fn from_item(item: &ListingItem, region: &Region, value: Option<String>) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            address: item.address.clone(),
            value,
            region: region.name.clone(),
            scraped_at: Utc::now(),
        }
    }
}

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:,\d+)*").expect("static pattern is valid"));

/// Extract the first number from a detail cell, keeping thousands separators.
///
/// Example: `"12,345 枚（令和5年）"` → `Some("12,345")`
pub fn parse_numeric_value(text: &str) -> Option<String> {
    NUMBER.find(text).map(|m| m.as_str().to_string())
}
