//! Advisory risk scoring.
//!
//! A pure function over the assembled record: fixed weights, summed and
//! clamped to `[0, 100]`. Age comparisons are made against the scan's
//! start instant so that scoring is deterministic for a whole run.

use chrono::{DateTime, Utc};

use crate::scan::enrich::urlscan::Verdict;
use crate::scan::permutation::Fuzzer;
use crate::scan::record::PermutationRecord;
use crate::scan::whois;

const URLSCAN_MALICIOUS: i64 = 25;
const URLSCAN_SUSPICIOUS: i64 = 15;
const RECENT_90_DAYS: i64 = 15;
const RECENT_30_DAYS_EXTRA: i64 = 10;
const HTTP_ACTIVE: i64 = 10;
const CT_PRESENT: i64 = 5;
const HOMOGLYPH_FUZZER: i64 = 10;
const COMBO_FUZZER: i64 = 5;
const PRIVACY_WHOIS: i64 = 5;

/// Score one record. `now` is the scan start time.
pub fn score(record: &PermutationRecord, now: DateTime<Utc>) -> u8 {
    let mut total: i64 = 0;

    if let Some(urlscan) = &record.threat_intel.urlscan {
        match urlscan.verdict {
            Verdict::Malicious => total += URLSCAN_MALICIOUS,
            Verdict::Suspicious => total += URLSCAN_SUSPICIOUS,
            Verdict::Clean | Verdict::Unknown => {}
        }
    }

    if let Some(created) = record.whois.creation_date {
        let age_days = (now - created).num_days();
        if (0..=90).contains(&age_days) {
            total += RECENT_90_DAYS;
            if age_days <= 30 {
                total += RECENT_30_DAYS_EXTRA;
            }
        }
    }

    if record
        .threat_intel
        .http_probe
        .as_ref()
        .map_or(false, |probe| probe.active)
    {
        total += HTTP_ACTIVE;
    }

    if record
        .threat_intel
        .certificate_transparency
        .as_ref()
        .map_or(false, |ct| ct.count >= 1)
    {
        total += CT_PRESENT;
    }

    match record.fuzzer {
        Fuzzer::Homoglyph | Fuzzer::IdnHomograph => total += HOMOGLYPH_FUZZER,
        Fuzzer::Combo | Fuzzer::Subdomain => total += COMBO_FUZZER,
        _ => {}
    }

    if whois::uses_privacy_service(&record.whois) {
        total += PRIVACY_WHOIS;
    }

    total.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::enrich::ct::CtResult;
    use crate::scan::enrich::http_probe::HttpProbeResult;
    use crate::scan::enrich::urlscan::{ScanSource, UrlScanResult};
    use crate::scan::record::{PermutationRecord, ThreatIntel};
    use crate::scan::resolver::DnsRecords;
    use crate::scan::whois::WhoisRecord;
    use chrono::Duration;

    fn base(fuzzer: Fuzzer) -> PermutationRecord {
        PermutationRecord {
            seed: "example.com".to_string(),
            domain: "examp1e.com".to_string(),
            fuzzer,
            registered: true,
            dns: DnsRecords::default(),
            whois: WhoisRecord::default(),
            threat_intel: ThreatIntel::default(),
            risk_score: 0,
            ml: None,
        }
    }

    fn urlscan(verdict: Verdict) -> UrlScanResult {
        UrlScanResult {
            verdict,
            score: 0,
            report_url: None,
            screenshot_url: None,
            scan_age_days: 0,
            source: ScanSource::Existing,
        }
    }

    #[test]
    fn bare_record_scores_zero() {
        assert_eq!(score(&base(Fuzzer::Omission), Utc::now()), 0);
    }

    #[test]
    fn fuzzer_bonuses() {
        let now = Utc::now();
        assert_eq!(score(&base(Fuzzer::Homoglyph), now), 10);
        assert_eq!(score(&base(Fuzzer::IdnHomograph), now), 10);
        assert_eq!(score(&base(Fuzzer::Combo), now), 5);
        assert_eq!(score(&base(Fuzzer::Subdomain), now), 5);
        assert_eq!(score(&base(Fuzzer::TldSwap), now), 0);
    }

    #[test]
    fn registration_age_tiers() {
        let now = Utc::now();

        let mut brand_new = base(Fuzzer::Omission);
        brand_new.whois.creation_date = Some(now - Duration::days(5));
        assert_eq!(score(&brand_new, now), 25);

        let mut recent = base(Fuzzer::Omission);
        recent.whois.creation_date = Some(now - Duration::days(60));
        assert_eq!(score(&recent, now), 15);

        let mut old = base(Fuzzer::Omission);
        old.whois.creation_date = Some(now - Duration::days(365));
        assert_eq!(score(&old, now), 0);
    }

    #[test]
    fn urlscan_verdict_weights() {
        let now = Utc::now();
        let mut malicious = base(Fuzzer::Omission);
        malicious.threat_intel.urlscan = Some(urlscan(Verdict::Malicious));
        assert_eq!(score(&malicious, now), 25);

        let mut suspicious = base(Fuzzer::Omission);
        suspicious.threat_intel.urlscan = Some(urlscan(Verdict::Suspicious));
        assert_eq!(score(&suspicious, now), 15);

        let mut clean = base(Fuzzer::Omission);
        clean.threat_intel.urlscan = Some(urlscan(Verdict::Clean));
        assert_eq!(score(&clean, now), 0);
    }

    #[test]
    fn full_signal_set_stays_within_bounds() {
        let now = Utc::now();
        let mut record = base(Fuzzer::Homoglyph);
        record.threat_intel.urlscan = Some(urlscan(Verdict::Malicious));
        record.whois.creation_date = Some(now - Duration::days(3));
        record.whois.registrar = Some("Privacy Protect LLC".to_string());
        record.threat_intel.http_probe = Some(HttpProbeResult {
            status_code: Some(200),
            active: true,
            final_url: "https://examp1e.com/".to_string(),
            chain_length: 0,
        });
        record.threat_intel.certificate_transparency = Some(CtResult {
            count: 3,
            ..Default::default()
        });

        // 25 + 15 + 10 + 10 + 5 + 10 + 5 = 80
        let total = score(&record, now);
        assert_eq!(total, 80);
        assert!(total <= 100);
    }

    #[test]
    fn scoring_is_deterministic() {
        let now = Utc::now();
        let mut record = base(Fuzzer::Combo);
        record.whois.creation_date = Some(now - Duration::days(10));
        assert_eq!(score(&record, now), score(&record, now));
    }
}
