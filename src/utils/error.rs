use thiserror::Error;

#[derive(Error, Debug)]
pub enum DominanceError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Report source error: {message}")]
    SourceError { message: String },

    #[error("Command '{command}' failed: {message}")]
    CommandError { command: String, message: String },

    #[error("Command '{command}' timed out after {seconds}s")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Source,
    Processing,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl DominanceError {
    pub fn source_error(message: impl Into<String>) -> Self {
        Self::SourceError {
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::ApiError(_)
            | Self::SourceError { .. }
            | Self::CommandError { .. }
            | Self::CommandTimeout { .. } => ErrorCategory::Source,
            Self::CsvError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                ErrorCategory::Processing
            }
            Self::ZipError(_) | Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 來源暫時失敗，下一輪刷新可能恢復
            Self::ApiError(_) | Self::CommandTimeout { .. } | Self::SourceError { .. } => {
                ErrorSeverity::Medium
            }
            Self::CommandError { .. }
            | Self::CsvError(_)
            | Self::SerializationError(_)
            | Self::ProcessingError { .. }
            | Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::High,
            Self::ZipError(_) | Self::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ApiError(_) => "Check that the report endpoint is reachable and retry".to_string(),
            Self::SourceError { .. } => {
                "Verify the report source or configure a report cache to fall back on".to_string()
            }
            Self::CommandError { command, .. } => {
                format!("Run '{}' manually and confirm it exits successfully", command)
            }
            Self::CommandTimeout { .. } => {
                "Increase the timeout or check whether the command hangs".to_string()
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => {
                "Fix the configuration value and run again".to_string()
            }
            Self::MissingConfigError { field } => format!("Provide a value for '{}'", field),
            Self::CsvError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                "Inspect the report text; run with --verbose for details".to_string()
            }
            Self::ZipError(_) | Self::IoError(_) => {
                "Check file permissions and available disk space".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Source => format!("Could not obtain the ranking report: {}", self),
            ErrorCategory::Processing => format!("Could not process the ranking report: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }

    /// 對應程序結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, DominanceError>;
