//! Liveness probe of a candidate's web endpoint.
//!
//! HEAD first (GET as fallback for servers that reject HEAD), `https`
//! before `http`, following at most five redirects and reading at most
//! 4 KB of body. Unlike the other enrichers, a probe that fails still
//! yields a populated result: a dead endpoint is a signal, not a miss.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

const MAX_REDIRECTS: usize = 5;
const MAX_BODY_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpProbeResult {
    pub status_code: Option<u16>,
    pub active: bool,
    pub final_url: String,
    pub chain_length: usize,
}

pub struct HttpProbe {
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout_secs: u64) -> HttpProbe {
        HttpProbe {
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn cache_key(&self, domain: &str) -> String {
        domain.to_string()
    }

    pub async fn fetch(&self, domain: &str) -> HttpProbeResult {
        for scheme in ["https", "http"] {
            let url = format!("{}://{}/", scheme, domain);
            if let Some(result) = self.attempt(&url).await {
                return result;
            }
        }
        log::debug!("http probe: {} unreachable on both schemes", domain);
        HttpProbeResult {
            status_code: None,
            active: false,
            final_url: format!("https://{}/", domain),
            chain_length: 0,
        }
    }

    async fn attempt(&self, url: &str) -> Option<HttpProbeResult> {
        // per-attempt client: the redirect policy smuggles the hop count
        // out through this counter
        let hops = Arc::new(AtomicUsize::new(0));
        let counter = hops.clone();
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::custom(move |attempt| {
                counter.store(attempt.previous().len(), Ordering::Relaxed);
                if attempt.previous().len() > MAX_REDIRECTS {
                    attempt.stop()
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .ok()?;

        let response = match client.head(url).send().await {
            Ok(response) if response.status() != reqwest::StatusCode::METHOD_NOT_ALLOWED => {
                response
            }
            _ => client.get(url).send().await.ok()?,
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        // drain up to 4 KB so keep-alive works, then drop the rest
        let mut response = response;
        let mut taken = 0usize;
        while let Ok(Some(chunk)) = response.chunk().await {
            taken += chunk.len();
            if taken >= MAX_BODY_BYTES {
                break;
            }
        }

        Some(HttpProbeResult {
            status_code: Some(status),
            active: (200..400).contains(&status),
            final_url,
            chain_length: hops.load(Ordering::Relaxed),
        })
    }
}
