use crate::adapters::metadata::{CommandMetadataProvider, ModelSizeStore};
use crate::adapters::report_source::DEFAULT_TIMEOUT_SECONDS;
use crate::config::toml_config::{SourceConfig, SUPPORTED_FORMATS};
use crate::core::ConfigProvider;
use crate::utils::error::{DominanceError, Result};
use crate::utils::validation::{self, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "miner-dominance")]
#[command(about = "Parse a miner ranking report and compute the dominance relation")]
pub struct CliConfig {
    /// Read the ranking report from a file
    #[arg(long)]
    pub report_file: Option<String>,

    /// Run this program to print the ranking report
    #[arg(long)]
    pub report_command: Option<String>,

    /// Extra argument for --report-command (repeatable)
    #[arg(long = "command-arg", allow_hyphen_values = true)]
    pub command_args: Vec<String>,

    /// Fetch the ranking report over HTTP
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, value_delimiter = ',', default_value = "json,csv")]
    pub formats: Vec<String>,

    /// Override the environment list taken from the report header
    #[arg(long, value_delimiter = ',')]
    pub environments: Vec<String>,

    /// Bundle all outputs into this ZIP file
    #[arg(long)]
    pub bundle: Option<String>,

    /// Keep the last good report here and fall back to it on failure
    #[arg(long)]
    pub report_cache: Option<String>,

    /// JSON dictionary of model sizes in GB
    #[arg(long)]
    pub model_sizes: Option<String>,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout_seconds: u64,

    /// Keep refreshing instead of running once
    #[arg(long)]
    pub watch: bool,

    #[arg(long, default_value_t = 300)]
    pub interval_seconds: u64,

    #[arg(long, default_value_t = 60)]
    pub min_refresh_seconds: u64,

    /// Print the dominators of this uid
    #[arg(long)]
    pub uid: Option<u32>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

impl CliConfig {
    /// 三種來源必須恰好指定一種
    pub fn source_config(&self) -> Result<SourceConfig> {
        let selected = [
            self.report_file.is_some(),
            self.report_command.is_some(),
            self.endpoint.is_some(),
        ]
        .iter()
        .filter(|&&set| set)
        .count();

        if selected != 1 {
            return Err(DominanceError::ConfigError {
                message: "specify exactly one of --report-file, --report-command, --endpoint"
                    .to_string(),
            });
        }

        let source = if let Some(path) = &self.report_file {
            SourceConfig::file(path.clone())
        } else if let Some(program) = &self.report_command {
            let mut argv = vec![program.clone()];
            argv.extend(self.command_args.iter().cloned());
            SourceConfig::command(argv)
        } else {
            SourceConfig::http(self.endpoint.clone().unwrap_or_default())
        };

        Ok(source.with_timeout(self.timeout_seconds))
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_seconds)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub async fn metadata_provider(&self) -> Option<CommandMetadataProvider> {
        let path = self.model_sizes.as_ref()?;
        let store = ModelSizeStore::load(path).await;
        Some(
            CommandMetadataProvider::new(Duration::from_secs(self.timeout_seconds))
                .with_size_store(store),
        )
    }
}

impl ConfigProvider for CliConfig {
    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.formats
    }

    fn environments(&self) -> &[String] {
        &self.environments
    }

    fn bundle_filename(&self) -> Option<&str> {
        self.bundle.as_deref()
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        self.source_config()?.validate_source()?;
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_one_of("formats", &self.formats, &SUPPORTED_FORMATS)?;
        validation::validate_positive_number("timeout_seconds", self.timeout_seconds, 1)?;
        validation::validate_positive_number("interval_seconds", self.interval_seconds, 1)?;
        if let Some(cache) = &self.report_cache {
            validation::validate_path("report_cache", cache)?;
        }
        if let Some(bundle) = &self.bundle {
            validation::validate_path("bundle", bundle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConfig {
        let mut argv = vec!["miner-dominance"];
        argv.extend_from_slice(args);
        CliConfig::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--report-file", "rank.txt"]);
        assert_eq!(config.formats, vec!["json", "csv"]);
        assert_eq!(config.output_path, "./output");
        assert!(config.environments.is_empty());
        assert_eq!(config.min_refresh_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_command_source_keeps_arguments() {
        let config = parse(&[
            "--report-command",
            "af",
            "--command-arg",
            "get-rank",
            "--command-arg",
            "--no-color",
        ]);
        let source = config.source_config().unwrap();
        assert_eq!(source.r#type, "command");
        assert_eq!(
            source.command.unwrap(),
            vec!["af".to_string(), "get-rank".to_string(), "--no-color".to_string()]
        );
    }

    #[test]
    fn test_exactly_one_source_required() {
        assert!(parse(&[]).validate().is_err());
        assert!(parse(&["--report-file", "a.txt", "--endpoint", "http://x"])
            .validate()
            .is_err());
    }

    #[test]
    fn test_environment_override_and_bad_format() {
        let config = parse(&["--report-file", "a.txt", "--environments", "SAT,ABD"]);
        assert_eq!(config.environments(), ["SAT".to_string(), "ABD".to_string()].as_slice());

        let config = parse(&["--report-file", "a.txt", "--formats", "json,xml"]);
        assert!(config.validate().is_err());
    }
}
