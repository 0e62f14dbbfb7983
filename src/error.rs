//! Error types for tiller-dns.

use thiserror::Error;

/// Errors that can occur in the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record store error
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// HTTP client error (health probes)
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Record value does not match the grammar for its type
    #[error("invalid record data: {0}")]
    InvalidRecord(String),

    /// Response could not be serialized to wire format
    #[error("response encoding failed: {0}")]
    Encode(String),
}
