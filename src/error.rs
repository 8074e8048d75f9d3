// src/error.rs

use thiserror::Error;

/// Core error types for bci-build
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A remote fetch failed (transport error or non-success status)
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Repository or service metadata could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Malformed replacement directive
    #[error("Invalid replacement: {0}")]
    InvalidReplacement(String),

    /// Package is not present in the pinned version store
    #[error("Package {0} not tracked")]
    UntrackedPackage(String),

    /// Code stream is not present for a tracked package
    #[error("OS Version {code_stream} not tracked for package {package}")]
    UntrackedCodeStream { package: String, code_stream: String },

    /// Requested version granularity cannot be computed locally
    #[error("Invalid version format: {0}")]
    UnsupportedVersionFormat(String),

    /// Version string could not be truncated
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    /// A third-party package did not resolve to exactly one RPM for an architecture
    #[error(
        "It should have found 1 package '{package}' for '{arch}' in the repository, but found {found}"
    )]
    PackageCount {
        package: String,
        arch: String,
        found: usize,
    },

    /// A resolved package points outside its repository or has a bad name
    #[error("Untrusted package {name}: {reason}")]
    UntrustedPackage { name: String, reason: String },

    /// Invalid image or repository configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias using bci-build's Error type
pub type Result<T> = std::result::Result<T, Error>;
