use thiserror::Error;

/// Main error type for the KubeSweep system
#[derive(Error, Debug)]
pub enum ExpError {
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Job template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {var} not set")]
    MissingEnvironment { var: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ExpError {
    /// Whether this error reports that the resource already exists upstream.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ExpError::Store(StoreError::AlreadyExists { .. }))
    }

    /// Whether this error reports that the resource is absent upstream.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExpError::Store(
                StoreError::ExperimentNotFound { .. }
                    | StoreError::ResultNotFound { .. }
                    | StoreError::JobNotFound { .. }
            )
        )
    }
}

/// Parameter space and parameter point errors
#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("Invalid parameter space: parameter {name} has no candidate values")]
    InvalidParameterSpace { name: String },

    #[error("Duplicate parameter name: {name}")]
    DuplicateParameter { name: String },

    #[error("Unsupported value for parameter {name}: {value}")]
    UnsupportedValue { name: String, value: String },

    #[error("Malformed parameter point: {message}")]
    MalformedPoint { message: String },
}

/// Job template errors raised while materializing a job
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Container templates are not available in job template of experiment {experiment}")]
    MissingContainerSpec { experiment: String },

    #[error("Experiment {experiment} has no job template")]
    MissingJobTemplate { experiment: String },

    #[error("Experiment {experiment} has not been persisted (no uid)")]
    MissingIdentity { experiment: String },

    #[error("Invalid job spec for experiment {experiment}: {message}")]
    InvalidJobSpec { experiment: String, message: String },
}

/// Errors surfaced by the resource store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("Experiment not found: {name}")]
    ExperimentNotFound { name: String },

    #[error("Result not found: {name}")]
    ResultNotFound { name: String },

    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    #[error("Conflicting update of {kind} {name}")]
    Conflict { kind: String, name: String },

    #[error("Upstream failure: {message}")]
    UpstreamFailure { message: String },
}

/// Result type alias for KubeSweep operations
pub type ExpResult<T> = Result<T, ExpError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::ExpError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::ExpError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ExpError::Config(format!($($arg)*))
    };
}
