//! urlscan.io enrichment.
//!
//! Two-phase protocol: look for an existing scan of the domain that is
//! recent enough, and only submit a fresh scan when none exists. A
//! submitted scan is polled until the result materializes or the wait
//! budget runs out; a poll timeout yields no result (never an error).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::scan::errors::NetError;
use crate::scan::retry::RetryPolicy;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_BASE_URL: &str = "https://urlscan.io";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Malicious,
    Suspicious,
    Clean,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    /// Reused a scan someone already ran.
    Existing,
    /// We submitted the scan ourselves.
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlScanResult {
    pub verdict: Verdict,
    /// Normalized to `[0, 100]`.
    pub score: i64,
    pub report_url: Option<String>,
    pub screenshot_url: Option<String>,
    pub scan_age_days: i64,
    pub source: ScanSource,
}

pub struct UrlScanClient {
    http: reqwest::Client,
    api_key: String,
    max_age_days: u32,
    visibility: String,
    wait_timeout: Duration,
    base_url: String,
    search_retry: RetryPolicy,
}

impl UrlScanClient {
    pub fn new(
        api_key: String,
        max_age_days: u32,
        wait_timeout_secs: u64,
        visibility: &str,
    ) -> Result<UrlScanClient, crate::scan::errors::FatalError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                crate::scan::errors::FatalError::config(format!(
                    "urlscan http client: {}",
                    err
                ))
            })?;
        Ok(UrlScanClient {
            http,
            api_key,
            max_age_days,
            visibility: visibility.to_string(),
            wait_timeout: Duration::from_secs(wait_timeout_secs),
            base_url: DEFAULT_BASE_URL.to_string(),
            search_retry: RetryPolicy::exponential(
                2,
                Duration::from_secs(30),
                Duration::from_secs(1),
            ),
        })
    }

    /// Point the client at a different API host, e.g. a local recorder
    /// in tests.
    pub fn with_base_url(mut self, base_url: &str) -> UrlScanClient {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Results are cached per `(domain, max_age_days)`: changing the
    /// freshness window must not reuse entries admitted under another.
    pub fn cache_key(&self, domain: &str) -> String {
        format!("{}:{}", domain, self.max_age_days)
    }

    /// `None` means the enricher failed or produced nothing in time; the
    /// record field stays null.
    pub async fn fetch(&self, domain: &str) -> Option<UrlScanResult> {
        match self
            .search_retry
            .run(&format!("urlscan search {}", domain), || {
                self.search_existing(domain)
            })
            .await
        {
            Ok(Some(existing)) => return Some(existing),
            Ok(None) => {}
            Err(err) => {
                log::warn!("urlscan search for {} failed: {}", domain, err);
                return None;
            }
        }

        match self.submit_and_poll(domain).await {
            Ok(result) => result,
            Err(err) => {
                log::warn!("urlscan submit for {} failed: {}", domain, err);
                None
            }
        }
    }

    async fn search_existing(&self, domain: &str) -> Result<Option<UrlScanResult>, NetError> {
        let url = format!(
            "{}/api/v1/search/?q=domain:{}&size=1",
            self.base_url, domain
        );
        let body: serde_json::Value = self
            .http
            .get(&url)
            .header("API-Key", self.api_key.as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let hit = match body["results"].as_array().and_then(|r| r.first()) {
            Some(hit) => hit,
            None => return Ok(None),
        };

        let task_time = hit["task"]["time"]
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc));
        let age_days = match task_time {
            Some(time) => (Utc::now() - time).num_days(),
            None => return Ok(None),
        };
        if age_days < 0 || age_days > i64::from(self.max_age_days) {
            return Ok(None);
        }

        let uuid = match hit["task"]["uuid"].as_str().or_else(|| hit["_id"].as_str()) {
            Some(uuid) => uuid,
            None => return Ok(None),
        };

        match self.fetch_result(uuid).await? {
            Some(mut result) => {
                result.source = ScanSource::Existing;
                result.scan_age_days = age_days;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn submit_and_poll(&self, domain: &str) -> Result<Option<UrlScanResult>, NetError> {
        let body = serde_json::json!({
            "url": format!("https://{}/", domain),
            "visibility": self.visibility,
        });
        let submitted: serde_json::Value = self
            .http
            .post(format!("{}/api/v1/scan/", self.base_url))
            .header("API-Key", self.api_key.as_str())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let uuid = submitted["uuid"]
            .as_str()
            .ok_or_else(|| NetError::Malformed("scan submission without uuid".to_string()))?
            .to_string();

        let deadline = Instant::now() + self.wait_timeout;
        loop {
            sleep(POLL_INTERVAL).await;
            if Instant::now() >= deadline {
                log::debug!(
                    "urlscan result for {} not ready within {:?}",
                    domain,
                    self.wait_timeout
                );
                return Ok(None);
            }
            if let Some(result) = self.fetch_result(&uuid).await? {
                return Ok(Some(result));
            }
        }
    }

    /// `Ok(None)` while the scan is still processing (404 from the
    /// result endpoint).
    async fn fetch_result(&self, uuid: &str) -> Result<Option<UrlScanResult>, NetError> {
        let url = format!("{}/api/v1/result/{}/", self.base_url, uuid);
        let response = self
            .http
            .get(&url)
            .header("API-Key", self.api_key.as_str())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: serde_json::Value = response.error_for_status()?.json().await?;
        Ok(Some(parse_result(uuid, &body)))
    }
}

fn parse_result(uuid: &str, body: &serde_json::Value) -> UrlScanResult {
    let overall = &body["verdicts"]["overall"];
    let raw_score = overall["score"].as_i64().unwrap_or(0);
    let malicious = overall["malicious"].as_bool().unwrap_or(false);

    let verdict = if malicious {
        Verdict::Malicious
    } else if raw_score > 0 {
        Verdict::Suspicious
    } else if overall.is_object() {
        Verdict::Clean
    } else {
        Verdict::Unknown
    };

    let report_url = body["task"]["reportURL"]
        .as_str()
        .map(str::to_string)
        .or_else(|| Some(format!("https://urlscan.io/result/{}/", uuid)));
    let screenshot_url = body["task"]["screenshotURL"]
        .as_str()
        .map(str::to_string)
        .or_else(|| Some(format!("https://urlscan.io/screenshots/{}.png", uuid)));

    UrlScanResult {
        verdict,
        score: raw_score.clamp(0, 100),
        report_url,
        screenshot_url,
        scan_age_days: 0,
        source: ScanSource::Submitted,
    }
}
