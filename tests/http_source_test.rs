use anyhow::Result;
use httpmock::prelude::*;
use miner_dominance::adapters::report_source::{build_report_source, with_report_cache};
use miner_dominance::config::toml_config::TomlConfig;
use miner_dominance::domain::model::ReportOrigin;
use miner_dominance::{LocalStorage, ReportPipeline, SnapshotService};
use std::time::Duration;
use tempfile::TempDir;

const REPORT: &str = "\
MINER RANKING TABLE - Block 880
Hotkey | UID | Model | FirstBlk | SAT | ABD | Total | Weight | V
5Aaa | 1 | org/early | 100 | 80.00[75.00]/50 | 60.00[55.00]/50 | 9.0 | 0.6 | Y
5Bbb | 2 | org/late | 200 | 70.00[72.00]/50 | 50.00[52.00]/50 | 3.0 | 0.0 | N
";

fn toml_config(endpoint: &str, output_path: &str) -> Result<TomlConfig> {
    let content = format!(
        r#"
[pipeline]
name = "http-dominance"

[source]
type = "http"
endpoint = "{endpoint}"
timeout_seconds = 5

[source.headers]
x-api-key = "test-key"

[refresh]
min_interval_seconds = 0

[load]
output_path = "{output_path}"
output_formats = ["json"]

[load.compression]
enabled = true
filename = "dominance.zip"
"#
    );
    Ok(TomlConfig::from_toml_str(&content)?)
}

#[tokio::test]
async fn test_http_report_through_snapshot_service() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/rank").header("x-api-key", "test-key");
        then.status(200).body(REPORT);
    });

    let config = toml_config(&server.url("/rank"), &output_path)?;
    let source = build_report_source(&config.source)?;
    let service = SnapshotService::new(
        ReportPipeline::new(LocalStorage::new(output_path.clone()), config.clone(), source),
        config.min_refresh_interval(),
    );

    let outcome = service.get(false).await?;
    api_mock.assert();
    assert!(outcome.fresh);
    assert_eq!(outcome.snapshot.origin, ReportOrigin::Http);
    assert_eq!(outcome.snapshot.block, Some(880));
    assert!(outcome.snapshot.miner(2).unwrap().is_dominated);

    let written = service.export(&outcome.snapshot).await?;
    assert!(written.ends_with("dominance.zip"));

    let zip_bytes = std::fs::read(temp_dir.path().join("dominance.zip"))?;
    let archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes))?;
    assert_eq!(archive.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_http_failure_served_from_report_cache() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let cache_file = temp_dir.path().join("cache").join("last_report.txt");
    std::fs::create_dir_all(cache_file.parent().unwrap())?;
    std::fs::write(&cache_file, REPORT)?;

    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/rank");
        then.status(502);
    });

    let config = toml_config(&server.url("/rank"), &output_path)?;
    let source = with_report_cache(
        build_report_source(&config.source)?,
        cache_file.to_str(),
    );
    let service = SnapshotService::new(
        ReportPipeline::new(LocalStorage::new(output_path), config, source),
        Duration::ZERO,
    );

    let outcome = service.get(true).await?;
    api_mock.assert();
    assert_eq!(outcome.snapshot.origin, ReportOrigin::Cache);
    assert_eq!(outcome.snapshot.total_models, 2);

    Ok(())
}
