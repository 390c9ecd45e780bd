use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Invalid postcode: {value:?}")]
    InvalidPostcode { value: String },

    #[error("{kind} {key} not found")]
    RecordNotFound { kind: String, key: String },

    #[error("Document store unreachable: {0}")]
    StoreConnectivity(#[from] reqwest::Error),

    #[error("Document store returned {status}: {body}")]
    StoreResponse { status: u16, body: String },

    #[error("Source data format error: {message}")]
    SourceDataFormat { message: String },

    #[error("Could not transform field {field} (value {value:?}): {reason}")]
    Transform {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Blob not found: {key}")]
    BlobNotFound { key: String },

    #[error("Blob store error: {message}")]
    BlobStore { message: String },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration field {field} is required")]
    MissingConfigError { field: String },

    #[error("Invalid value {value:?} for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration {field} failed validation: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Store,
    Source,
    Config,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn invalid_postcode(value: impl Into<String>) -> Self {
        Self::InvalidPostcode {
            value: value.into(),
        }
    }

    pub fn not_found(kind: &str, key: impl Into<String>) -> Self {
        Self::RecordNotFound {
            kind: kind.to_string(),
            key: key.into(),
        }
    }

    pub fn source_format(message: impl Into<String>) -> Self {
        Self::SourceDataFormat {
            message: message.into(),
        }
    }

    pub fn transform(field: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Transform {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPostcode { .. }
            | Self::RecordNotFound { .. }
            | Self::Transform { .. }
            | Self::InvalidQuery { .. } => ErrorCategory::Input,
            Self::StoreConnectivity(_)
            | Self::StoreResponse { .. }
            | Self::BlobNotFound { .. }
            | Self::BlobStore { .. } => ErrorCategory::Store,
            Self::SourceDataFormat { .. } | Self::ZipError(_) | Self::CsvError(_) => {
                ErrorCategory::Source
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Config,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::Low,
            ErrorCategory::Store => ErrorSeverity::Medium,
            ErrorCategory::Source | ErrorCategory::Config => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InvalidPostcode { .. } => "Check the postcode is a complete UK postcode",
            Self::RecordNotFound { .. } => "Check the code exists in the imported data",
            Self::StoreConnectivity(_) => {
                "Check ELASTICSEARCH_URL and that the document store is running"
            }
            Self::StoreResponse { .. } => {
                "Inspect the document store response; run init-db if indices are missing"
            }
            Self::SourceDataFormat { .. } | Self::ZipError(_) | Self::CsvError(_) => {
                "Check the source URL or file points at the expected dataset release"
            }
            Self::Transform { .. } => "Inspect the offending row in the source file",
            Self::BlobNotFound { .. } | Self::BlobStore { .. } => {
                "Check the boundary storage settings and re-run the boundaries import"
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => {
                "Review the environment variables and configuration file"
            }
            Self::InvalidQuery { .. } => "Check the query syntax and field names",
            Self::IoError(_) | Self::SerializationError(_) => {
                "Check file permissions and available disk space"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Input => format!("Request could not be completed: {}", self),
            ErrorCategory::Store => format!("Storage problem: {}", self),
            ErrorCategory::Source => format!("Dataset problem: {}", self),
            ErrorCategory::Config => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_low_severity() {
        let err = EtlError::invalid_postcode("XX");
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_source_errors_are_high_severity() {
        let err = EtlError::source_format("no csv members");
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.user_friendly_message().starts_with("Dataset problem"));
    }

    #[test]
    fn test_not_found_message() {
        let err = EtlError::not_found("Postcode", "SW1A 1AA");
        assert_eq!(err.to_string(), "Postcode SW1A 1AA not found");
    }
}
