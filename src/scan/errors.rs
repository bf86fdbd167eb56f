//! Error types for the scan pipeline.
//!
//! The taxonomy is deliberately small: only configuration and input
//! problems are fatal. Everything network-shaped degrades — a failed
//! lookup becomes a null field, a failed cache access becomes a direct
//! fetch — and the scan keeps going.

use std::io;

use derive_more::{Display, Error, From};

/// Fatal errors surfaced by the binary before or instead of a scan.
#[derive(Debug, Display, Error)]
pub enum FatalError {
    /// Invalid configuration value or file. Exit code 1.
    #[display(fmt = "configuration error: {}", _0)]
    Config(#[error(not(source))] String),

    /// Unusable input: no valid seed survived parsing. Exit code 1.
    #[display(fmt = "input error: {}", _0)]
    Input(#[error(not(source))] String),

    /// Filesystem trouble while reading seeds or writing reports.
    #[display(fmt = "i/o error: {}", _0)]
    Io(io::Error),

    /// A report writer could not produce its output file.
    #[display(fmt = "export error: {}", _0)]
    Export(#[error(not(source))] String),
}

impl FatalError {
    pub fn config(message: impl Into<String>) -> FatalError {
        FatalError::Config(message.into())
    }

    pub fn input(message: impl Into<String>) -> FatalError {
        FatalError::Input(message.into())
    }
}

impl From<io::Error> for FatalError {
    fn from(err: io::Error) -> FatalError {
        FatalError::Io(err)
    }
}

/// Failure of a single network operation.
///
/// Retried by [`crate::scan::retry::RetryPolicy`] when
/// [`NetError::is_retryable`] holds; on exhaustion the owning enrichment
/// field degrades to a miss instead of aborting the scan.
#[derive(Debug, Display, Error)]
pub enum NetError {
    #[display(fmt = "timed out after {}s", _0)]
    Timeout(#[error(not(source))] u64),

    #[display(fmt = "i/o: {}", _0)]
    Io(io::Error),

    #[display(fmt = "http: {}", _0)]
    Http(reqwest::Error),

    #[display(fmt = "dns: {}", _0)]
    Resolve(#[error(not(source))] String),

    /// The remote answered but refused to serve us (rate limit, quota).
    #[display(fmt = "refused by server: {}", _0)]
    Refused(#[error(not(source))] String),

    /// The remote answered with something we could not interpret.
    #[display(fmt = "malformed response: {}", _0)]
    Malformed(#[error(not(source))] String),
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> NetError {
        NetError::Io(err)
    }
}

impl From<reqwest::Error> for NetError {
    fn from(err: reqwest::Error) -> NetError {
        NetError::Http(err)
    }
}

impl NetError {
    /// Whether another attempt has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetError::Timeout(_) => true,
            NetError::Io(_) => true,
            NetError::Resolve(_) => true,
            NetError::Refused(_) => true,
            NetError::Http(err) => {
                if err.is_timeout() || err.is_connect() {
                    return true;
                }
                match err.status() {
                    Some(status) => status.is_server_error() || status.as_u16() == 429,
                    None => false,
                }
            }
            NetError::Malformed(_) => false,
        }
    }
}

/// Cache access problems. Never fatal: the caller logs a warning and
/// performs the fetch without the cache.
#[derive(Debug, Display, From, Error)]
pub enum CacheIoError {
    #[display(fmt = "cache i/o: {}", _0)]
    Io(io::Error),

    #[display(fmt = "cache entry decode: {}", _0)]
    Decode(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        assert!(NetError::Timeout(30).is_retryable());
    }

    #[test]
    fn refused_is_retryable() {
        assert!(NetError::Refused("query rate exceeded".into()).is_retryable());
    }

    #[test]
    fn malformed_is_not_retryable() {
        assert!(!NetError::Malformed("bad json".into()).is_retryable());
    }

    #[test]
    fn fatal_error_formats_with_kind() {
        let err = FatalError::config("max_workers must be >= 1");
        assert_eq!(
            err.to_string(),
            "configuration error: max_workers must be >= 1"
        );
    }
}
