use crate::adapters::command::CommandSpec;
use crate::adapters::metadata::{CommandMetadataProvider, ModelSizeStore};
use crate::adapters::report_source::DEFAULT_TIMEOUT_SECONDS;
use crate::core::ConfigProvider;
use crate::utils::error::{DominanceError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const SUPPORTED_FORMATS: [&str; 2] = ["json", "csv"];
pub const DEFAULT_MIN_REFRESH_SECONDS: u64 = 60;
pub const DEFAULT_WATCH_INTERVAL_SECONDS: u64 = 300;
const MAX_INTERVAL_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub refresh: Option<RefreshConfig>,
    pub metadata: Option<MetadataConfig>,
    pub analysis: Option<AnalysisConfig>,
    pub load: LoadConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// file | command | http
    pub r#type: String,
    pub path: Option<String>,
    pub command: Option<Vec<String>>,
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub min_interval_seconds: Option<u64>,
    pub watch_interval_seconds: Option<u64>,
    /// 最近一份成功取得的報表文字
    pub cache_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub commits_command: Option<Vec<String>>,
    pub keys_command: Option<Vec<String>>,
    pub sizes_command: Option<Vec<String>>,
    pub model_sizes_path: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub environments: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_formats: Vec<String>,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}

impl SourceConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self::of_type("file").with(|s| s.path = Some(path.into()))
    }

    pub fn command(argv: Vec<String>) -> Self {
        Self::of_type("command").with(|s| s.command = Some(argv))
    }

    pub fn http(endpoint: impl Into<String>) -> Self {
        Self::of_type("http").with(|s| s.endpoint = Some(endpoint.into()))
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    fn of_type(kind: &str) -> Self {
        Self {
            r#type: kind.to_string(),
            path: None,
            command: None,
            endpoint: None,
            timeout_seconds: None,
            headers: None,
        }
    }

    fn with(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }

    pub fn validate_source(&self) -> Result<()> {
        match self.r#type.as_str() {
            "file" => {
                let path = validation::validate_required_field("source.path", &self.path)?;
                validation::validate_path("source.path", path)?;
            }
            "command" => {
                let argv = validation::validate_required_field("source.command", &self.command)?;
                let program = argv.first().map(String::as_str).unwrap_or_default();
                validation::validate_non_empty_string("source.command", program)?;
            }
            "http" => {
                let endpoint = validation::validate_required_field("source.endpoint", &self.endpoint)?;
                validation::validate_url("source.endpoint", endpoint)?;
            }
            other => {
                return Err(DominanceError::InvalidConfigValueError {
                    field: "source.type".to_string(),
                    value: other.to_string(),
                    reason: "Supported types: file, command, http".to_string(),
                })
            }
        }

        if let Some(timeout) = self.timeout_seconds {
            validation::validate_positive_number("source.timeout_seconds", timeout, 1)?;
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        match self.r#type.as_str() {
            "file" => format!("file {}", self.path.as_deref().unwrap_or("?")),
            "command" => format!(
                "command '{}'",
                self.command.as_deref().unwrap_or_default().join(" ")
            ),
            "http" => format!("endpoint {}", self.endpoint.as_deref().unwrap_or("?")),
            other => other.to_string(),
        }
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(DominanceError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| DominanceError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${RANK_API_KEY})
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::LazyLock;

        static ENV_VAR_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        self.source.validate_source()?;

        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_one_of("load.output_formats", &self.load.output_formats, &SUPPORTED_FORMATS)?;
        if let Some(compression) = self.load.compression.as_ref().filter(|c| c.enabled) {
            validation::validate_path("load.compression.filename", &compression.filename)?;
        }

        if let Some(refresh) = &self.refresh {
            if let Some(seconds) = refresh.min_interval_seconds {
                validation::validate_range("refresh.min_interval_seconds", seconds, 0, MAX_INTERVAL_SECONDS)?;
            }
            if let Some(seconds) = refresh.watch_interval_seconds {
                validation::validate_range("refresh.watch_interval_seconds", seconds, 1, MAX_INTERVAL_SECONDS)?;
            }
            if let Some(cache_file) = &refresh.cache_file {
                validation::validate_path("refresh.cache_file", cache_file)?;
            }
        }

        if let Some(metadata) = &self.metadata {
            if let Some(path) = &metadata.model_sizes_path {
                validation::validate_path("metadata.model_sizes_path", path)?;
            }
            if let Some(timeout) = metadata.timeout_seconds {
                validation::validate_positive_number("metadata.timeout_seconds", timeout, 1)?;
            }
        }

        Ok(())
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.refresh
                .as_ref()
                .and_then(|r| r.min_interval_seconds)
                .unwrap_or(DEFAULT_MIN_REFRESH_SECONDS),
        )
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(
            self.refresh
                .as_ref()
                .and_then(|r| r.watch_interval_seconds)
                .unwrap_or(DEFAULT_WATCH_INTERVAL_SECONDS),
        )
    }

    pub fn cache_file(&self) -> Option<&str> {
        self.refresh.as_ref().and_then(|r| r.cache_file.as_deref())
    }

    pub fn verbose(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.verbose).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }

    /// 建立輔助資訊查詢器；沒有任何設定時回傳 None
    pub async fn metadata_provider(&self) -> Option<CommandMetadataProvider> {
        let metadata = self.metadata.as_ref()?;
        let timeout = Duration::from_secs(metadata.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let mut provider = CommandMetadataProvider::new(timeout);

        if let Some(spec) = metadata.commits_command.as_deref().and_then(CommandSpec::from_argv) {
            provider = provider.with_commits(spec);
        }
        if let Some(spec) = metadata.keys_command.as_deref().and_then(CommandSpec::from_argv) {
            provider = provider.with_keys(spec);
        }
        if let Some(spec) = metadata.sizes_command.as_deref().and_then(CommandSpec::from_argv) {
            provider = provider.with_sizes(spec);
        }
        if let Some(path) = &metadata.model_sizes_path {
            provider = provider.with_size_store(ModelSizeStore::load(path).await);
        }

        provider.is_configured().then_some(provider)
    }
}

impl ConfigProvider for TomlConfig {
    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.load.output_formats
    }

    fn environments(&self) -> &[String] {
        self.analysis
            .as_ref()
            .and_then(|a| a.environments.as_deref())
            .unwrap_or_default()
    }

    fn bundle_filename(&self) -> Option<&str> {
        self.load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.as_str())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
