//! Error types for the Litmus operators

use thiserror::Error;

/// Errors surfaced by a reconcile pass or by the runtime host around it
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid operator or charm configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The workload container rejected or failed an operation
    #[error("Workload error: {0}")]
    WorkloadError(String),

    /// Key, CSR or certificate handling failed
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// The reverse proxy was asked for a config before both peers were known
    #[error("Missing {0} endpoint for reverse proxy configuration")]
    MissingEndpoint(&'static str),

    /// litmusctl exited non-zero inside the workload container
    #[error("litmusctl command failed (exit {exit_code}): {command}\nstderr: {stderr}")]
    LitmusctlError {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Whether the next event is likely to succeed without operator action
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::WorkloadError(_) | Error::IoError(_)
        )
    }
}

impl From<rcgen::Error> for Error {
    fn from(e: rcgen::Error) -> Self {
        Error::CertificateError(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
