//! The per-permutation record emitted to exporters, plus the emission
//! ordering and the recent-registration filter.

use chrono::{DateTime, Months, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::scan::enrich::ct::CtResult;
use crate::scan::enrich::http_probe::HttpProbeResult;
use crate::scan::enrich::urlscan::UrlScanResult;
use crate::scan::ml::MlAssessment;
use crate::scan::permutation::Fuzzer;
use crate::scan::resolver::DnsRecords;
use crate::scan::whois::WhoisRecord;

/// Threat-intel fields. A null field means the enricher was disabled,
/// skipped, or failed after retries; it is never a partial structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatIntel {
    pub urlscan: Option<UrlScanResult>,
    pub certificate_transparency: Option<CtResult>,
    pub http_probe: Option<HttpProbeResult>,
}

/// One registered candidate with everything we learned about it.
/// Immutable once assembled by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationRecord {
    pub seed: String,
    pub domain: String,
    pub fuzzer: Fuzzer,
    pub registered: bool,
    pub dns: DnsRecords,
    pub whois: WhoisRecord,
    pub threat_intel: ThreatIntel,
    pub risk_score: u8,
    pub ml: Option<MlAssessment>,
}

/// Metadata attached to every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMeta {
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub seeds: Vec<String>,
    pub enabled_features: Vec<String>,
}

/// Emission order within one seed: descending risk, then domain.
pub fn sort_for_emission(records: &mut [PermutationRecord]) {
    records.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| a.domain.cmp(&b.domain))
    });
}

/// Keep only records registered within the last `months` months. Zero
/// disables the filter. With the filter active, a record without a
/// parsed creation date cannot prove recency and is dropped.
pub fn apply_months_filter(
    records: Vec<PermutationRecord>,
    months: u32,
    now: DateTime<Utc>,
) -> Vec<PermutationRecord> {
    if months == 0 {
        return records;
    }
    let cutoff = match now.checked_sub_months(Months::new(months)) {
        Some(cutoff) => cutoff,
        None => return records,
    };
    records
        .into_iter()
        .filter(|record| {
            record
                .whois
                .creation_date
                .map_or(false, |created| created >= cutoff)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn stub_record(domain: &str, risk: u8) -> PermutationRecord {
        PermutationRecord {
            seed: "example.com".to_string(),
            domain: domain.to_string(),
            fuzzer: Fuzzer::Omission,
            registered: true,
            dns: DnsRecords::default(),
            whois: WhoisRecord::default(),
            threat_intel: ThreatIntel::default(),
            risk_score: risk,
            ml: None,
        }
    }

    #[test]
    fn emission_order_is_risk_desc_then_domain_asc() {
        let mut records = vec![
            stub_record("bbb.com", 10),
            stub_record("aaa.com", 10),
            stub_record("zzz.com", 90),
        ];
        sort_for_emission(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(order, vec!["zzz.com", "aaa.com", "bbb.com"]);
    }

    #[test]
    fn months_filter_keeps_recent_drops_old_and_undated() {
        let now = Utc::now();
        let mut recent = stub_record("young.com", 0);
        recent.whois.creation_date = Some(now - Duration::days(10));
        let mut old = stub_record("old.com", 0);
        old.whois.creation_date = Some(now - Duration::days(60));
        let undated = stub_record("undated.com", 0);

        let kept = apply_months_filter(vec![recent, old, undated], 1, now);
        let names: Vec<&str> = kept.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(names, vec!["young.com"]);
    }

    #[test]
    fn months_filter_zero_is_a_no_op() {
        let records = vec![stub_record("a.com", 0), stub_record("b.com", 0)];
        let kept = apply_months_filter(records.clone(), 0, Utc::now());
        assert_eq!(kept, records);
    }

    #[test]
    fn months_filter_is_idempotent() {
        let now = Utc::now();
        let mut recent = stub_record("young.com", 0);
        recent.whois.creation_date = Some(now - Duration::days(10));
        let mut old = stub_record("old.com", 0);
        old.whois.creation_date = Some(now - Duration::days(400));

        let once = apply_months_filter(vec![recent, old], 6, now);
        let twice = apply_months_filter(once.clone(), 6, now);
        assert_eq!(once, twice);
    }

    #[test]
    fn json_shape_mirrors_the_schema() {
        let mut record = stub_record("exmple.com", 42);
        record.dns.a = vec!["192.0.2.10".to_string()];
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["seed"], "example.com");
        assert_eq!(value["fuzzer"], "omission");
        assert_eq!(value["registered"], true);
        assert_eq!(value["dns"]["a"][0], "192.0.2.10");
        assert!(value["threat_intel"]["urlscan"].is_null());
        assert!(value["ml"].is_null());
        assert_eq!(value["risk_score"], 42);
    }
}
