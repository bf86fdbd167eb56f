//! Certificate-transparency enrichment via the public crt.sh endpoint.
//!
//! No key required. The signal is coarse: how many CT log entries name
//! the candidate, which CAs issued for it, and when it was first and
//! last seen.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::scan::errors::{FatalError, NetError};
use crate::scan::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://crt.sh";

/// Cache TTL for CT results.
pub const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CtResult {
    pub count: u64,
    pub issuers: Vec<String>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    issuer_name: Option<String>,
    entry_timestamp: Option<String>,
}

pub struct CtClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CtClient {
    pub fn new() -> Result<CtClient, FatalError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| FatalError::config(format!("ct http client: {}", err)))?;
        Ok(CtClient {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::exponential(2, Duration::from_secs(15), Duration::from_secs(1)),
        })
    }

    /// Point the client at a different endpoint, e.g. a local recorder
    /// in tests.
    pub fn with_base_url(mut self, base_url: &str) -> CtClient {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn cache_key(&self, domain: &str) -> String {
        domain.to_string()
    }

    /// `None` on any failure; the record field stays null.
    pub async fn fetch(&self, domain: &str) -> Option<CtResult> {
        match self
            .retry
            .run(&format!("ct {}", domain), || self.query(domain))
            .await
        {
            Ok(result) => Some(result),
            Err(err) => {
                log::warn!("certificate transparency for {} failed: {}", domain, err);
                None
            }
        }
    }

    async fn query(&self, domain: &str) -> Result<CtResult, NetError> {
        let url = format!("{}/?q={}&output=json", self.base_url, domain);
        let entries: Vec<CrtShEntry> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(summarize(&entries))
    }
}

fn summarize(entries: &[CrtShEntry]) -> CtResult {
    let mut issuers = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut first_seen: Option<DateTime<Utc>> = None;
    let mut last_seen: Option<DateTime<Utc>> = None;

    for entry in entries {
        if let Some(issuer) = entry.issuer_name.as_deref() {
            let issuer = issuer.trim();
            if !issuer.is_empty() && seen.insert(issuer.to_string()) {
                issuers.push(issuer.to_string());
            }
        }
        if let Some(stamp) = entry.entry_timestamp.as_deref().and_then(parse_timestamp) {
            first_seen = Some(first_seen.map_or(stamp, |cur| cur.min(stamp)));
            last_seen = Some(last_seen.map_or(stamp, |cur| cur.max(stamp)));
        }
    }
    issuers.sort();

    CtResult {
        count: entries.len() as u64,
        issuers,
        first_seen,
        last_seen,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // crt.sh emits naive timestamps like 2024-10-01T12:00:00.123
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(issuer: &str, stamp: &str) -> CrtShEntry {
        CrtShEntry {
            issuer_name: Some(issuer.to_string()),
            entry_timestamp: Some(stamp.to_string()),
        }
    }

    #[test]
    fn summarize_counts_and_dedups_issuers() {
        let entries = vec![
            entry("C=US, O=Let's Encrypt, CN=R11", "2024-06-01T00:00:00.000"),
            entry("C=US, O=Let's Encrypt, CN=R11", "2024-08-15T10:30:00.000"),
            entry("C=US, O=Google Trust Services, CN=WR3", "2024-07-01T00:00:00.000"),
        ];
        let result = summarize(&entries);
        assert_eq!(result.count, 3);
        assert_eq!(result.issuers.len(), 2);
        assert!(result.issuers[0] < result.issuers[1], "issuers are sorted");
        assert_eq!(
            result.first_seen.map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2024-06-01".to_string())
        );
        assert_eq!(
            result.last_seen.map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2024-08-15".to_string())
        );
    }

    #[test]
    fn empty_log_is_a_valid_result() {
        let result = summarize(&[]);
        assert_eq!(result.count, 0);
        assert!(result.issuers.is_empty());
        assert!(result.first_seen.is_none());
    }

    #[test]
    fn unparseable_timestamps_are_skipped() {
        let entries = vec![CrtShEntry {
            issuer_name: None,
            entry_timestamp: Some("not a date".to_string()),
        }];
        let result = summarize(&entries);
        assert_eq!(result.count, 1);
        assert!(result.first_seen.is_none());
    }
}
