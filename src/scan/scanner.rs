//! Scan orchestration.
//!
//! Per seed, Phase A streams candidates out of the generator and probes
//! DNS in batches of `max_workers`, sleeping `rate_limit_delay` between
//! batches. Registered candidates move to Phase B, where the WHOIS and
//! threat-intel enrichers run concurrently, each behind its own
//! semaphore and provider token bucket. Risk scoring and the ML hook
//! run after enrichment; the months filter and emission sort close out
//! the seed.
//!
//! Seeds are scanned with bounded look-ahead but always emitted in
//! input order; within a seed, records are sorted by descending risk
//! then ascending domain. No single domain, enricher or seed can abort
//! a scan.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};

use crate::scan::cache::{CacheStats, FileCache};
use crate::scan::config::{Config, Toggle};
use crate::scan::enrich::http_probe::HttpProbeResult;
use crate::scan::enrich::urlscan::UrlScanResult;
use crate::scan::enrich::{ct::CtResult, EnricherSet};
use crate::scan::errors::FatalError;
use crate::scan::ml::MlScorer;
use crate::scan::permutation::{self, Candidate, FuzzerToggles};
use crate::scan::rate_limit::TokenBucket;
use crate::scan::record::{self, PermutationRecord, ScanMeta, ThreatIntel};
use crate::scan::resolver::{DnsProbe, DnsRecords, Probe};
use crate::scan::risk;
use crate::scan::secrets;
use crate::scan::whois::{self, WhoisClient, WhoisOutcome, WhoisRecord};

/// Seeds scanned concurrently. Output stays in input order regardless.
const SEED_LOOKAHEAD: usize = 4;

/// Result of one full scan.
pub struct ScanOutcome {
    pub records: Vec<PermutationRecord>,
    /// Active-learning sidecar: records near the ML decision boundary.
    pub review: Vec<PermutationRecord>,
    pub seeds_attempted: usize,
    /// Seeds that produced zero records while transient errors were
    /// observed; a non-empty list maps to exit code 2.
    pub seeds_failed: Vec<String>,
    /// Enricher names that failed at least once during the scan.
    pub degraded: Vec<String>,
    pub cache_stats: Option<CacheStats>,
    pub meta: ScanMeta,
}

struct SeedResult {
    seed: String,
    records: Vec<PermutationRecord>,
    transient_trouble: bool,
}

struct EnrichLimits {
    whois: Semaphore,
    urlscan: Semaphore,
    ct: Semaphore,
    http: Semaphore,
}

struct ProviderBuckets {
    whois: TokenBucket,
    urlscan: TokenBucket,
    ct: TokenBucket,
    http: TokenBucket,
}

pub struct Scanner {
    config: Config,
    cache: Option<FileCache>,
    probe: DnsProbe,
    whois: WhoisClient,
    enrichers: EnricherSet,
    ml: Option<MlScorer>,
    limits: EnrichLimits,
    buckets: ProviderBuckets,
    degraded: Mutex<BTreeSet<&'static str>>,
}

impl Scanner {
    /// Assemble a scanner from a validated configuration. Secret
    /// resolution happens here, once, so `enable_urlscan: auto` is
    /// settled before the first candidate is probed.
    pub async fn build(config: Config) -> Result<Scanner, FatalError> {
        config.validate()?;

        let urlscan_key = match config.enable_urlscan {
            Toggle::Off => None,
            Toggle::On | Toggle::Auto => {
                secrets::resolve("urlscan_api_key", config.urlscan_api_key.as_deref()).await
            }
        };
        let enrichers = EnricherSet::from_config(&config, urlscan_key)?;

        let ml = if config.enable_ml {
            Some(MlScorer::from_path(
                config.ml_model_path.as_deref(),
                config.ml_confidence_threshold,
                config.ml_uncertainty_threshold,
            )?)
        } else {
            None
        };

        let cache = if config.use_cache {
            let cache = FileCache::new(&config.cache_dir);
            match cache.clear_expired() {
                Ok(0) => {}
                Ok(removed) => log::info!("cache: dropped {} expired entries", removed),
                Err(err) => log::warn!("cache sweep failed: {}", err),
            }
            Some(cache)
        } else {
            None
        };

        Ok(Scanner {
            probe: DnsProbe::new(config.dns_retry_count),
            whois: WhoisClient::new(
                config.whois_timeout,
                config.whois_retry_count.max(1),
                config.whois_retry_delay,
            ),
            enrichers,
            ml,
            cache,
            limits: EnrichLimits {
                whois: Semaphore::new(8),
                urlscan: Semaphore::new(4),
                ct: Semaphore::new(10),
                http: Semaphore::new(20),
            },
            buckets: ProviderBuckets {
                whois: TokenBucket::new(4, 4.0),
                urlscan: TokenBucket::per_interval(Duration::from_secs_f64(
                    config.urlscan_submit_interval,
                )),
                ct: TokenBucket::new(5, 5.0),
                http: TokenBucket::new(10, 10.0),
            },
            degraded: Mutex::new(BTreeSet::new()),
            config,
        })
    }

    /// Scan all seeds and return the ordered record sequence.
    pub async fn scan(&self, seeds: &[String]) -> ScanOutcome {
        let started_at = Utc::now();
        let deadline = self
            .config
            .scan_deadline
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let results: Vec<SeedResult> = stream::iter(seeds.iter().cloned())
            .map(|seed| self.scan_seed(seed, started_at, deadline))
            .buffered(SEED_LOOKAHEAD.min(seeds.len().max(1)))
            .collect()
            .await;

        let mut records = Vec::new();
        let mut seeds_failed = Vec::new();
        for result in results {
            if result.records.is_empty() && result.transient_trouble {
                seeds_failed.push(result.seed.clone());
            }
            log::info!(
                "seed {}: {} registered permutation(s)",
                result.seed,
                result.records.len()
            );
            records.extend(result.records);
        }

        let review = match (&self.ml, self.config.ml_enable_active_learning) {
            (Some(ml), true) => ml.select_for_review(&records, self.config.ml_review_budget),
            _ => Vec::new(),
        };

        let meta = ScanMeta {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at: Utc::now(),
            seeds: seeds.to_vec(),
            enabled_features: self
                .config
                .enabled_features(&self.enrichers.enabled_names()),
        };

        ScanOutcome {
            review,
            seeds_attempted: seeds.len(),
            seeds_failed,
            degraded: self.degraded.lock().iter().map(|s| s.to_string()).collect(),
            cache_stats: self.cache.as_ref().map(FileCache::stats),
            records,
            meta,
        }
    }

    async fn scan_seed(
        &self,
        seed: String,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> SeedResult {
        let toggles = FuzzerToggles {
            combosquatting: self.config.enable_combosquatting,
            soundalike: self.config.enable_soundalike,
            idn_homograph: self.config.enable_idn_homograph,
        };
        let mut candidates = match permutation::generate(&seed, &toggles) {
            Ok(candidates) => candidates.peekable(),
            Err(reason) => {
                log::warn!("skipping seed {}: {}", seed, reason);
                return SeedResult {
                    seed,
                    records: Vec::new(),
                    transient_trouble: false,
                };
            }
        };

        // Phase A: probe DNS in batches, admitting registered candidates
        let mut registered: Vec<(Candidate, DnsRecords)> = Vec::new();
        let mut transient_trouble = false;
        let mut first_batch = true;
        while candidates.peek().is_some() {
            if expired(deadline) {
                log::warn!("scan deadline reached, stopping admissions for {}", seed);
                break;
            }
            if !first_batch && self.config.rate_limit_delay > 0.0 {
                sleep(Duration::from_secs_f64(self.config.rate_limit_delay)).await;
            }
            first_batch = false;

            let batch: Vec<Candidate> =
                candidates.by_ref().take(self.config.max_workers).collect();
            let probes =
                futures::future::join_all(batch.iter().map(|c| self.probe.probe(&c.domain)))
                    .await;
            for (candidate, probe) in batch.into_iter().zip(probes) {
                match probe {
                    Probe::Registered(dns) => registered.push((candidate, dns)),
                    Probe::Unregistered => {}
                    Probe::TransientFailure => transient_trouble = true,
                }
            }
        }
        log::debug!(
            "seed {}: {} candidate(s) registered after dns phase",
            seed,
            registered.len()
        );

        // Phase B: enrich concurrently, bounded by the worker pool
        let budget = self.candidate_budget();
        let enriched: Vec<Option<PermutationRecord>> = stream::iter(registered)
            .map(|(candidate, dns)| {
                self.enrich_candidate(&seed, candidate, dns, now, deadline, budget)
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .collect()
            .await;

        let mut records: Vec<PermutationRecord> = enriched.into_iter().flatten().collect();
        if let Some(ml) = &self.ml {
            ml.apply(&mut records, now);
        }
        let mut records = record::apply_months_filter(records, self.config.months_filter, now);
        record::sort_for_emission(&mut records);

        SeedResult {
            seed,
            records,
            transient_trouble,
        }
    }

    /// Per-candidate budget: the largest enabled enricher timeout with
    /// 50% headroom.
    fn candidate_budget(&self) -> Duration {
        let mut max_secs = self.config.whois_timeout;
        if self.enrichers.urlscan.is_some() {
            max_secs = max_secs.max(self.config.urlscan_wait_timeout);
        }
        if self.enrichers.certificate_transparency.is_some() {
            max_secs = max_secs.max(15);
        }
        if self.enrichers.http_probe.is_some() {
            max_secs = max_secs.max(self.config.http_timeout);
        }
        Duration::from_secs_f64(max_secs as f64 * 1.5)
    }

    async fn enrich_candidate(
        &self,
        seed: &str,
        candidate: Candidate,
        dns: DnsRecords,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
        budget: Duration,
    ) -> Option<PermutationRecord> {
        if expired(deadline) {
            return None;
        }
        // the global deadline shrinks the per-candidate budget; a
        // candidate that cannot finish in time is discarded whole
        // rather than emitted half-populated
        let budget = match deadline {
            Some(deadline) => budget.min(deadline.saturating_duration_since(Instant::now())),
            None => budget,
        };

        let domain = candidate.domain.clone();
        let work = async {
            tokio::join!(
                self.whois_for(&domain, budget),
                self.urlscan_for(&domain, budget),
                self.ct_for(&domain, budget),
                self.http_for(&domain, budget),
            )
        };
        let (whois_record, urlscan, certificate_transparency, http_probe) =
            match timeout(budget, work).await {
                Ok(results) => results,
                Err(_) => {
                    log::warn!("candidate {} exceeded its enrichment budget", domain);
                    return None;
                }
            };

        let mut record = PermutationRecord {
            seed: seed.to_string(),
            domain: candidate.domain,
            fuzzer: candidate.fuzzer,
            registered: true,
            dns,
            whois: whois_record,
            threat_intel: ThreatIntel {
                urlscan,
                certificate_transparency,
                http_probe,
            },
            risk_score: 0,
            ml: None,
        };
        if self.config.enable_risk_scoring {
            record.risk_score = risk::score(&record, now);
        }
        Some(record)
    }

    async fn whois_for(&self, domain: &str, budget: Duration) -> WhoisRecord {
        let _permit = match self.limits.whois.acquire().await {
            Ok(permit) => permit,
            Err(_) => return WhoisRecord::default(),
        };
        self.buckets.whois.acquire().await;

        let lookup = async {
            match &self.cache {
                Some(cache) => cache
                    .get_or_fetch("whois", domain, || async move {
                        let outcome = self.whois.lookup(domain).await;
                        let ttl = match &outcome {
                            WhoisOutcome::Ok(_) => self.config.cache_ttl,
                            WhoisOutcome::Unavailable => whois::NEGATIVE_TTL_SECS,
                        };
                        Some((outcome, ttl))
                    })
                    .await
                    .unwrap_or(WhoisOutcome::Unavailable),
                None => self.whois.lookup(domain).await,
            }
        };

        // an individually stuck enricher nulls its own field only
        let outcome = match timeout(budget, lookup).await {
            Ok(outcome) => outcome,
            Err(_) => WhoisOutcome::Unavailable,
        };
        match outcome {
            WhoisOutcome::Ok(record) => record,
            WhoisOutcome::Unavailable => {
                self.note_degraded("whois");
                WhoisRecord::default()
            }
        }
    }

    async fn urlscan_for(&self, domain: &str, budget: Duration) -> Option<UrlScanResult> {
        let client = self.enrichers.urlscan.as_ref()?;
        let _permit = self.limits.urlscan.acquire().await.ok()?;
        self.buckets.urlscan.acquire().await;

        let key = client.cache_key(domain);
        let fetch = async {
            match &self.cache {
                Some(cache) => {
                    cache
                        .get_or_fetch("urlscan", &key, || async move {
                            client
                                .fetch(domain)
                                .await
                                .map(|result| (result, self.config.cache_ttl))
                        })
                        .await
                }
                None => client.fetch(domain).await,
            }
        };

        let result = timeout(budget, fetch).await.ok().flatten();
        if result.is_none() {
            self.note_degraded("urlscan");
        }
        result
    }

    async fn ct_for(&self, domain: &str, budget: Duration) -> Option<CtResult> {
        let client = self.enrichers.certificate_transparency.as_ref()?;
        let _permit = self.limits.ct.acquire().await.ok()?;
        self.buckets.ct.acquire().await;

        let key = client.cache_key(domain);
        let fetch = async {
            match &self.cache {
                Some(cache) => {
                    cache
                        .get_or_fetch("ct", &key, || async move {
                            client
                                .fetch(domain)
                                .await
                                .map(|result| (result, crate::scan::enrich::ct::CACHE_TTL_SECS))
                        })
                        .await
                }
                None => client.fetch(domain).await,
            }
        };

        let result = timeout(budget, fetch).await.ok().flatten();
        if result.is_none() {
            self.note_degraded("certificate_transparency");
        }
        result
    }

    async fn http_for(&self, domain: &str, budget: Duration) -> Option<HttpProbeResult> {
        let client = self.enrichers.http_probe.as_ref()?;
        let _permit = self.limits.http.acquire().await.ok()?;
        self.buckets.http.acquire().await;

        let key = client.cache_key(domain);
        let fetch = async {
            match &self.cache {
                Some(cache) => {
                    cache
                        .get_or_fetch("http", &key, || async move {
                            Some((client.fetch(domain).await, self.config.cache_ttl))
                        })
                        .await
                }
                None => Some(client.fetch(domain).await),
            }
        };

        match timeout(budget, fetch).await.ok().flatten() {
            Some(result) => Some(result),
            None => {
                // probe machinery failed outright; the probe itself
                // reports dead endpoints as a populated inactive result
                self.note_degraded("http_probe");
                Some(HttpProbeResult {
                    status_code: None,
                    active: false,
                    final_url: format!("https://{}/", domain),
                    chain_length: 0,
                })
            }
        }
    }

    fn note_degraded(&self, name: &'static str) {
        self.degraded.lock().insert(name);
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |deadline| Instant::now() >= deadline)
}

/// Read and normalize the seed file: UTF-8, one domain per line, blank
/// lines and `#` comments skipped, duplicates collapsed in first-seen
/// order. Fatal only when nothing valid remains.
pub fn load_seeds(path: &Path) -> Result<Vec<String>, FatalError> {
    let raw = std::fs::read_to_string(path)?;
    let mut seeds = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match permutation::normalize_seed(line) {
            Ok(seed) => {
                if seen.insert(seed.clone()) {
                    seeds.push(seed);
                }
            }
            Err(reason) => log::warn!("ignoring seed line {:?}: {}", line, reason),
        }
    }

    if seeds.is_empty() {
        return Err(FatalError::input(format!(
            "{} contains no usable seed domains",
            path.display()
        )));
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn seed_file(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seeds.txt");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(contents.as_bytes()).expect("write");
        (dir, path)
    }

    #[test]
    fn load_seeds_skips_comments_blanks_and_duplicates() {
        let (_dir, path) = seed_file("# brands\nexample.com\n\nEXAMPLE.COM\nexample.org\n");
        let seeds = load_seeds(&path).expect("seeds");
        assert_eq!(seeds, vec!["example.com", "example.org"]);
    }

    #[test]
    fn load_seeds_punycodes_unicode_input() {
        let (_dir, path) = seed_file("\u{0430}pple.com\n");
        let seeds = load_seeds(&path).expect("seeds");
        assert_eq!(seeds.len(), 1);
        assert!(seeds[0].starts_with("xn--"));
    }

    #[test]
    fn load_seeds_warns_but_survives_bad_lines() {
        let (_dir, path) = seed_file("not_a_domain\nexample.com\n");
        let seeds = load_seeds(&path).expect("seeds");
        assert_eq!(seeds, vec!["example.com"]);
    }

    #[test]
    fn load_seeds_fails_when_nothing_remains() {
        let (_dir, path) = seed_file("# nothing\n\n");
        assert!(load_seeds(&path).is_err());
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let mut config = Config::default();
        config.max_workers = 0;
        assert!(Scanner::build(config).await.is_err());
    }

    #[tokio::test]
    async fn build_with_defaults_disables_optional_enrichers() {
        let mut config = Config::default();
        config.use_cache = false;
        config.enable_urlscan = Toggle::Off;
        let scanner = Scanner::build(config).await.expect("scanner");
        assert!(scanner.enrichers.urlscan.is_none());
        assert!(scanner.enrichers.certificate_transparency.is_none());
        assert!(scanner.enrichers.http_probe.is_none());
        assert!(scanner.ml.is_none());
    }

    #[tokio::test]
    async fn candidate_budget_tracks_the_largest_enabled_timeout() {
        let mut config = Config::default();
        config.use_cache = false;
        config.enable_urlscan = Toggle::Off;
        let scanner = Scanner::build(config).await.expect("scanner");
        // whois (30s) is the only enabled enricher: 30 * 1.5
        assert_eq!(scanner.candidate_budget(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn scan_of_zero_seeds_is_empty_success() {
        let mut config = Config::default();
        config.use_cache = false;
        config.enable_urlscan = Toggle::Off;
        let scanner = Scanner::build(config).await.expect("scanner");
        let outcome = scanner.scan(&[]).await;
        assert!(outcome.records.is_empty());
        assert!(outcome.seeds_failed.is_empty());
        assert_eq!(outcome.seeds_attempted, 0);
    }
}
