//! Error types for the SimplISS NFSe client.

use thiserror::Error;

/// Errors raised by the NFSe client.
#[derive(Error, Debug)]
pub enum NfseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No service was found for municipality [{municipality}] in environment [{environment}]")]
    CatalogNotFound {
        municipality: String,
        environment: String,
    },

    #[error("Service [{service}] is not available for municipality [{municipality}]")]
    ServiceUnavailable {
        service: String,
        municipality: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Validation of [{operation}] against layout {version} failed: {}", issues.join("; "))]
    Validation {
        operation: String,
        version: String,
        issues: Vec<String>,
    },

    #[error("XML parsing error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NfseError {
    /// Stable string code for this error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIGURATION",
            Self::CatalogNotFound { .. } => "CATALOG_NOT_FOUND",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Transport(_) => "TRANSPORT",
            Self::Validation { .. } => "VALIDATION",
            Self::Xml(_) => "XML",
            Self::Io(_) => "IO",
        }
    }
}

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network, TLS or timeout failure.
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("[{url}] HTTP error code: {status}")]
    HttpStatus {
        url: String,
        status: u16,
        /// Response body, usually a SOAP Fault
        body: String,
    },

    /// Identity material could not be used for mutual TLS.
    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Proxy configuration error: {0}")]
    Proxy(String),
}
