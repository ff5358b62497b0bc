use crate::adapters::command::{run_command, CommandSpec};
use crate::config::storage::LocalStorage;
use crate::config::toml_config::SourceConfig;
use crate::domain::model::{RawReport, ReportOrigin};
use crate::domain::ports::{ReportSource, Storage};
use crate::utils::error::{DominanceError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Clone)]
pub struct FileReportSource {
    path: PathBuf,
}

impl FileReportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSource for FileReportSource {
    async fn fetch(&self) -> Result<RawReport> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(RawReport::new(text, ReportOrigin::File))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// 執行外部排名指令，stdout 即報表
#[derive(Debug, Clone)]
pub struct CommandReportSource {
    spec: CommandSpec,
    timeout: Duration,
}

impl CommandReportSource {
    pub fn new(spec: CommandSpec, timeout: Duration) -> Self {
        Self { spec, timeout }
    }
}

#[async_trait]
impl ReportSource for CommandReportSource {
    async fn fetch(&self) -> Result<RawReport> {
        let text = run_command(&self.spec, &[], self.timeout).await?;
        Ok(RawReport::new(text, ReportOrigin::Command))
    }

    fn describe(&self) -> String {
        format!("command '{}'", self.spec.display())
    }
}

#[derive(Debug, Clone)]
pub struct HttpReportSource {
    client: Client,
    endpoint: String,
    headers: HashMap<String, String>,
    timeout: Duration,
}

impl HttpReportSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            headers: HashMap::new(),
            timeout,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[async_trait]
impl ReportSource for HttpReportSource {
    async fn fetch(&self) -> Result<RawReport> {
        let mut request = self.client.get(&self.endpoint).timeout(self.timeout);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        tracing::debug!("Requesting report from: {}", self.endpoint);
        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("Report response status: {}", status);

        if !status.is_success() {
            return Err(DominanceError::source_error(format!(
                "{} returned HTTP {}",
                self.endpoint, status
            )));
        }

        Ok(RawReport::new(response.text().await?, ReportOrigin::Http))
    }

    fn describe(&self) -> String {
        format!("endpoint {}", self.endpoint)
    }
}

/// 成功時寫入快取檔，失敗時改讀快取檔
pub struct CachedReportSource<S: Storage> {
    inner: Box<dyn ReportSource>,
    storage: S,
    cache_file: String,
}

impl<S: Storage> CachedReportSource<S> {
    pub fn new(inner: Box<dyn ReportSource>, storage: S, cache_file: impl Into<String>) -> Self {
        Self {
            inner,
            storage,
            cache_file: cache_file.into(),
        }
    }
}

#[async_trait]
impl<S: Storage> ReportSource for CachedReportSource<S> {
    async fn fetch(&self) -> Result<RawReport> {
        match self.inner.fetch().await {
            Ok(report) => {
                if let Err(e) = self
                    .storage
                    .write_file(&self.cache_file, report.text.as_bytes())
                    .await
                {
                    tracing::warn!("⚠️ Could not update report cache {}: {}", self.cache_file, e);
                }
                Ok(report)
            }
            Err(fetch_error) => {
                tracing::warn!(
                    "⚠️ {} failed ({}), reading cached report {}",
                    self.inner.describe(),
                    fetch_error,
                    self.cache_file
                );
                let bytes = self.storage.read_file(&self.cache_file).await.map_err(|cache_error| {
                    DominanceError::source_error(format!(
                        "{}; cache unavailable: {}",
                        fetch_error, cache_error
                    ))
                })?;
                Ok(RawReport::new(
                    String::from_utf8_lossy(&bytes).into_owned(),
                    ReportOrigin::Cache,
                ))
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} (cached in {})", self.inner.describe(), self.cache_file)
    }
}

/// 依設定建立報表來源
pub fn build_report_source(config: &SourceConfig) -> Result<Box<dyn ReportSource>> {
    let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));

    match config.r#type.as_str() {
        "file" => {
            let path = config.path.as_ref().ok_or_else(|| DominanceError::MissingConfigError {
                field: "source.path".to_string(),
            })?;
            Ok(Box::new(FileReportSource::new(path)))
        }
        "command" => {
            let spec = config
                .command
                .as_deref()
                .and_then(CommandSpec::from_argv)
                .ok_or_else(|| DominanceError::MissingConfigError {
                    field: "source.command".to_string(),
                })?;
            Ok(Box::new(CommandReportSource::new(spec, timeout)))
        }
        "http" => {
            let endpoint = config
                .endpoint
                .as_ref()
                .ok_or_else(|| DominanceError::MissingConfigError {
                    field: "source.endpoint".to_string(),
                })?;
            let source = HttpReportSource::new(endpoint.clone(), timeout)
                .with_headers(config.headers.clone().unwrap_or_default());
            Ok(Box::new(source))
        }
        other => Err(DominanceError::InvalidConfigValueError {
            field: "source.type".to_string(),
            value: other.to_string(),
            reason: "Supported types: file, command, http".to_string(),
        }),
    }
}

/// 有設定快取檔時包上 [`CachedReportSource`]，路徑相對於工作目錄
pub fn with_report_cache(
    source: Box<dyn ReportSource>,
    cache_file: Option<&str>,
) -> Box<dyn ReportSource> {
    match cache_file {
        Some(cache_file) => Box::new(CachedReportSource::new(
            source,
            LocalStorage::new(".".to_string()),
            cache_file,
        )),
        None => source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    struct FailingSource;

    #[async_trait]
    impl ReportSource for FailingSource {
        async fn fetch(&self) -> Result<RawReport> {
            Err(DominanceError::source_error("ranking command unavailable"))
        }

        fn describe(&self) -> String {
            "failing source".to_string()
        }
    }

    fn source_config(kind: &str) -> SourceConfig {
        SourceConfig {
            r#type: kind.to_string(),
            path: None,
            command: None,
            endpoint: None,
            timeout_seconds: Some(5),
            headers: None,
        }
    }

    #[tokio::test]
    async fn test_http_source_returns_body() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/rank").header("x-api-key", "secret");
            then.status(200).body("MINER RANKING TABLE - Block 1\n");
        });

        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());
        let source =
            HttpReportSource::new(server.url("/rank"), Duration::from_secs(5)).with_headers(headers);

        let report = source.fetch().await.unwrap();
        api_mock.assert();
        assert_eq!(report.origin, ReportOrigin::Http);
        assert!(report.text.contains("Block 1"));
    }

    #[tokio::test]
    async fn test_http_source_rejects_error_status() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/rank");
            then.status(503);
        });

        let source = HttpReportSource::new(server.url("/rank"), Duration::from_secs(5));
        let err = source.fetch().await.unwrap_err();
        api_mock.assert();
        assert!(matches!(err, DominanceError::SourceError { .. }));
    }

    #[tokio::test]
    async fn test_file_source_reads_report() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rank.txt");
        std::fs::write(&path, "report body").unwrap();

        let report = FileReportSource::new(&path).fetch().await.unwrap();
        assert_eq!(report.text, "report body");
        assert_eq!(report.origin, ReportOrigin::File);
    }

    #[tokio::test]
    async fn test_cached_source_writes_and_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().to_str().unwrap().to_string();
        let report_path = temp_dir.path().join("rank.txt");
        std::fs::write(&report_path, "fresh report").unwrap();

        let cached = CachedReportSource::new(
            Box::new(FileReportSource::new(&report_path)),
            LocalStorage::new(base.clone()),
            "cache/last_report.txt",
        );
        let report = cached.fetch().await.unwrap();
        assert_eq!(report.origin, ReportOrigin::File);
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("cache/last_report.txt")).unwrap(),
            "fresh report"
        );

        let fallback = CachedReportSource::new(
            Box::new(FailingSource),
            LocalStorage::new(base),
            "cache/last_report.txt",
        );
        let report = fallback.fetch().await.unwrap();
        assert_eq!(report.origin, ReportOrigin::Cache);
        assert_eq!(report.text, "fresh report");
    }

    #[tokio::test]
    async fn test_cached_source_fails_without_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cached = CachedReportSource::new(
            Box::new(FailingSource),
            LocalStorage::new(temp_dir.path().to_str().unwrap().to_string()),
            "missing.txt",
        );
        let err = cached.fetch().await.unwrap_err();
        assert!(err.to_string().contains("ranking command unavailable"));
    }

    #[test]
    fn test_build_report_source_requires_fields() {
        assert!(build_report_source(&source_config("file")).is_err());
        assert!(build_report_source(&source_config("command")).is_err());
        assert!(build_report_source(&source_config("http")).is_err());
        assert!(build_report_source(&source_config("ftp")).is_err());

        let mut command = source_config("command");
        command.command = Some(vec!["af".to_string(), "get-rank".to_string()]);
        let source = build_report_source(&command).unwrap();
        assert_eq!(source.describe(), "command 'af get-rank'");

        let cached = with_report_cache(source, Some("cache/rank.txt"));
        assert_eq!(
            cached.describe(),
            "command 'af get-rank' (cached in cache/rank.txt)"
        );
    }
}
