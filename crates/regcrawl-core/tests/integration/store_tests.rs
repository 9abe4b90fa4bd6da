use std::fs;

use regcrawl_core::{Orchestrator, ProgressStore, Region, Statistics, TracingReporter};
use tokio_util::sync::CancellationToken;

use crate::integration::common::{FakeRegistry, fast_config};

#[tokio::test]
async fn crawl_leaves_expected_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeRegistry::new().with_region("13", 2, 5);
    let config = fast_config(dir.path());
    let mut stats = Statistics::new();

    Orchestrator::new(&driver, config.clone(), vec![Region::new("13", "東京都")])
        .unwrap()
        .run(&mut stats, &CancellationToken::new(), &TracingReporter)
        .await
        .unwrap();
    stats.save(&config.stats_path()).unwrap();

    let ledger_path = dir.path().join("13_東京都_records.csv");
    let bytes = fs::read(&ledger_path).unwrap();
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "id,name,address,value,region,scrapedAt");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("13-0001,Pharmacy 1,1-1 Main Street,10,東京都,"));
    assert!(lines[2].starts_with("13-0002,Pharmacy 2,2-1 Main Street,20,東京都,"));

    let progress: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.progress_path()).unwrap()).unwrap();
    assert_eq!(progress, serde_json::json!({"13": "DONE"}));

    let snapshot: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.stats_path()).unwrap()).unwrap();
    assert_eq!(snapshot["total_processed"], 2);
    assert_eq!(snapshot["total_with_data"], 2);
    assert_eq!(snapshot["region_stats"]["13"]["total"], 2);
}

#[tokio::test]
async fn progress_written_by_hand_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    fs::write(
        dir.path().join("13_東京都_records.csv"),
        "\u{feff}id,name,address,value,region,scrapedAt\nX1,Old,Addr,5,東京都,2024-01-01T00:00:00Z\n",
    )
    .unwrap();
    fs::write(config.progress_path(), r#"{"13": "DONE"}"#).unwrap();

    let store = ProgressStore::open(config.progress_path()).unwrap();
    assert!(store.is_done("13"));

    let driver = FakeRegistry::new().with_region("13", 4, 4);
    let mut stats = Statistics::new();
    let summary = Orchestrator::new(&driver, config, vec![Region::new("13", "東京都")])
        .unwrap()
        .run(&mut stats, &CancellationToken::new(), &TracingReporter)
        .await
        .unwrap();

    assert_eq!(summary.already_done, 1);
    assert!(driver.detail_visits().is_empty());
}
