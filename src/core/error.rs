//! Error types for butterfly-scenario
//!
//! Provides the error taxonomy for build, process, and query operations.

use std::fmt;

/// Main error type for butterfly-scenario operations
#[derive(Debug)]
pub enum Error {
    /// Missing input file, invalid profile/algorithm combination, or a table
    /// request exceeding the size cap the server was started with
    Configuration(String),

    /// A build-stage process (osrm-extract, osrm-partition, osrm-customize,
    /// osrm-contract) exited non-zero
    Build {
        stage: &'static str,
        status: Option<i32>,
    },

    /// A server process failed to launch or exited unexpectedly
    Process(String),

    /// Readiness was not observed within the startup bound
    Timeout(String),

    /// The query API rejected a request with a machine-readable body
    Query { code: String, message: String },

    /// HTTP-level failure talking to a query endpoint
    Http(String),

    /// Network connectivity issues
    Network(String),

    /// File I/O error
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            Error::Build { stage, status } => match status {
                Some(code) => write!(f, "Build stage '{}' exited with status {}", stage, code),
                None => write!(f, "Build stage '{}' was terminated by a signal", stage),
            },
            Error::Process(msg) => {
                write!(f, "Process error: {}", msg)
            }
            Error::Timeout(msg) => {
                write!(f, "Timed out: {}", msg)
            }
            Error::Query { code, message } => {
                write!(f, "Query error {}: {}", code, message)
            }
            Error::Http(msg) => {
                write!(f, "HTTP error: {}", msg)
            }
            Error::Network(msg) => {
                write!(f, "Network error: {}", msg)
            }
            Error::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::Network(err.to_string())
        } else {
            Error::Http(err.to_string())
        }
    }
}

/// Convenience result type for butterfly-scenario operations
pub type Result<T> = std::result::Result<T, Error>;
