//! DNS registration probe.
//!
//! A candidate counts as registered when any of its A, AAAA, MX or NS
//! queries returns an answer. NXDOMAIN and authoritative empty answers
//! across all four types mean unregistered; network trouble is retried
//! and, once retries are exhausted, demoted to unregistered with a
//! warning so a flaky resolver can never abort a scan.

use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use serde_derive::{Deserialize, Serialize};

use crate::scan::errors::NetError;
use crate::scan::retry::RetryPolicy;

/// Answers of interest for one candidate, possibly empty per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecords {
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub mx: Vec<String>,
    pub ns: Vec<String>,
}

impl DnsRecords {
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.aaaa.is_empty() && self.mx.is_empty() && self.ns.is_empty()
    }
}

/// Outcome of probing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Registered(DnsRecords),
    Unregistered,
    /// Treated as unregistered, but flagged so the scan summary can
    /// report seeds that may be incomplete.
    TransientFailure,
}

pub struct DnsProbe {
    resolver: TokioAsyncResolver,
    retry: RetryPolicy,
}

impl DnsProbe {
    /// `retry_count` is the number of retries after the first attempt.
    pub fn new(retry_count: u32) -> DnsProbe {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 1;

        DnsProbe {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
            retry: RetryPolicy::exponential(
                retry_count + 1,
                Duration::from_secs(8),
                Duration::from_millis(500),
            ),
        }
    }

    pub async fn probe(&self, domain: &str) -> Probe {
        // trailing dot keeps search-domain expansion out of the picture
        let fqdn = format!("{}.", domain);
        match self
            .retry
            .run(&format!("dns {}", domain), || self.lookup_all(&fqdn))
            .await
        {
            Ok(records) if records.is_empty() => Probe::Unregistered,
            Ok(records) => Probe::Registered(records),
            Err(err) => {
                log::warn!("dns probe for {} failed after retries: {}", domain, err);
                Probe::TransientFailure
            }
        }
    }

    async fn lookup_all(&self, fqdn: &str) -> Result<DnsRecords, NetError> {
        let mut records = DnsRecords::default();

        match self.resolver.ipv4_lookup(fqdn).await {
            Ok(lookup) => records.a = lookup.iter().map(|r| r.to_string()).collect(),
            Err(err) => classify(err)?,
        }
        match self.resolver.ipv6_lookup(fqdn).await {
            Ok(lookup) => records.aaaa = lookup.iter().map(|r| r.to_string()).collect(),
            Err(err) => classify(err)?,
        }
        match self.resolver.mx_lookup(fqdn).await {
            Ok(lookup) => {
                records.mx = lookup
                    .iter()
                    .map(|r| r.exchange().to_string().trim_end_matches('.').to_string())
                    .collect()
            }
            Err(err) => classify(err)?,
        }
        match self.resolver.ns_lookup(fqdn).await {
            Ok(lookup) => {
                records.ns = lookup
                    .iter()
                    .map(|r| r.to_string().trim_end_matches('.').to_string())
                    .collect()
            }
            Err(err) => classify(err)?,
        }

        Ok(records)
    }
}

/// NXDOMAIN and empty answers are fine (the type just has no records);
/// everything else bubbles up as a transient error.
fn classify(err: ResolveError) -> Result<(), NetError> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => Ok(()),
        _ => Err(NetError::Resolve(err.to_string())),
    }
}
