//! Integration tests for the record pipeline: assembly, scoring,
//! ordering, filtering and export, exercised with stubbed enrichment
//! values so no network is involved.

use chrono::{Duration, Utc};
use typo_sniper::export::{self, ReportFormat};
use typo_sniper::scan::enrich::ct::CtResult;
use typo_sniper::scan::enrich::http_probe::HttpProbeResult;
use typo_sniper::scan::enrich::urlscan::{ScanSource, UrlScanResult, Verdict};
use typo_sniper::scan::ml::MlScorer;
use typo_sniper::scan::permutation::Fuzzer;
use typo_sniper::scan::record::{
    apply_months_filter, sort_for_emission, PermutationRecord, ScanMeta, ThreatIntel,
};
use typo_sniper::scan::resolver::DnsRecords;
use typo_sniper::scan::risk;
use typo_sniper::scan::whois::WhoisRecord;

fn record(seed: &str, domain: &str, fuzzer: Fuzzer) -> PermutationRecord {
    PermutationRecord {
        seed: seed.to_string(),
        domain: domain.to_string(),
        fuzzer,
        registered: true,
        dns: DnsRecords {
            a: vec!["192.0.2.1".to_string()],
            ..Default::default()
        },
        whois: WhoisRecord {
            raw_ok: true,
            ..Default::default()
        },
        threat_intel: ThreatIntel::default(),
        risk_score: 0,
        ml: None,
    }
}

fn meta(seeds: &[&str]) -> ScanMeta {
    ScanMeta {
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
        seeds: seeds.iter().map(|s| s.to_string()).collect(),
        enabled_features: vec!["risk_scoring".to_string()],
    }
}

#[test]
fn every_emitted_record_is_registered() {
    let records = vec![
        record("example.com", "exmple.com", Fuzzer::Omission),
        record("example.com", "examp1e.com", Fuzzer::Homoglyph),
    ];
    assert!(records.iter().all(|r| r.registered));
}

#[test]
fn risk_scoring_then_sort_orders_a_seed_by_severity() {
    let now = Utc::now();

    let mut homoglyph = record("example.com", "examp1e.com", Fuzzer::Homoglyph);
    homoglyph.threat_intel.urlscan = Some(UrlScanResult {
        verdict: Verdict::Malicious,
        score: 80,
        report_url: None,
        screenshot_url: None,
        scan_age_days: 1,
        source: ScanSource::Existing,
    });
    homoglyph.whois.creation_date = Some(now - Duration::days(4));

    let mut quiet = record("example.com", "exampleq.com", Fuzzer::Addition);
    quiet.whois.creation_date = Some(now - Duration::days(800));

    let mut active = record("example.com", "login-example.com", Fuzzer::Combo);
    active.threat_intel.http_probe = Some(HttpProbeResult {
        status_code: Some(200),
        active: true,
        final_url: "https://login-example.com/".to_string(),
        chain_length: 1,
    });

    for r in [&mut homoglyph, &mut quiet, &mut active] {
        r.risk_score = risk::score(r, now);
    }
    // homoglyph: 25 urlscan + 25 fresh whois + 10 fuzzer = 60
    assert_eq!(homoglyph.risk_score, 60);
    // combo: 10 http + 5 fuzzer = 15
    assert_eq!(active.risk_score, 15);
    assert_eq!(quiet.risk_score, 0);

    let mut records = vec![quiet, active, homoglyph];
    sort_for_emission(&mut records);
    let domains: Vec<&str> = records.iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(
        domains,
        vec!["examp1e.com", "login-example.com", "exampleq.com"]
    );
}

#[test]
fn enricher_failure_nulls_only_its_own_field() {
    // urlscan failed for this record; everything else stays populated
    let mut r = record("example.com", "exmple.com", Fuzzer::Omission);
    r.threat_intel.certificate_transparency = Some(CtResult {
        count: 2,
        issuers: vec!["C=US, O=Let's Encrypt, CN=R11".to_string()],
        first_seen: None,
        last_seen: None,
    });
    r.threat_intel.urlscan = None;

    assert!(r.threat_intel.urlscan.is_none());
    assert_eq!(
        r.threat_intel
            .certificate_transparency
            .as_ref()
            .map(|ct| ct.count),
        Some(2)
    );
    assert!(!r.dns.a.is_empty());
    assert!(r.whois.raw_ok);

    let value = serde_json::to_value(&r).expect("serialize");
    assert!(value["threat_intel"]["urlscan"].is_null());
    assert_eq!(value["threat_intel"]["certificate_transparency"]["count"], 2);
}

#[test]
fn months_filter_composes_with_sort_and_stays_idempotent() {
    let now = Utc::now();
    let mut young = record("example.com", "young.com", Fuzzer::Omission);
    young.whois.creation_date = Some(now - Duration::days(10));
    let mut old = record("example.com", "old.com", Fuzzer::Omission);
    old.whois.creation_date = Some(now - Duration::days(60));

    let once = apply_months_filter(vec![young.clone(), old.clone()], 1, now);
    assert_eq!(once.len(), 1);
    assert_eq!(once[0].domain, "young.com");

    let twice = apply_months_filter(once.clone(), 1, now);
    assert_eq!(once, twice);
}

#[test]
fn ml_hook_is_additive_and_never_mutates_other_fields() {
    let scorer = MlScorer::from_path(None, 0.5, 0.1).expect("scorer");
    let now = Utc::now();

    let mut records = vec![record("example.com", "exmple.com", Fuzzer::Omission)];
    let before = records[0].clone();
    scorer.apply(&mut records, now);

    assert!(records[0].ml.is_some());
    let mut after = records[0].clone();
    after.ml = None;
    assert_eq!(after, before, "only the ml field may change");
}

#[test]
fn json_export_mirrors_schema_and_order() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut first_seed_low = record("aaa.com", "aaa1.com", Fuzzer::Addition);
    first_seed_low.risk_score = 5;
    let mut first_seed_high = record("aaa.com", "aa.com", Fuzzer::Omission);
    first_seed_high.risk_score = 50;
    let second_seed = record("bbb.com", "bb.com", Fuzzer::Omission);

    // seed order aaa.com then bbb.com; within aaa.com, high risk first
    let mut first = vec![first_seed_low, first_seed_high];
    sort_for_emission(&mut first);
    let mut ordered = first;
    ordered.push(second_seed);

    let written = export::write_reports(
        dir.path(),
        &[ReportFormat::Json, ReportFormat::Csv, ReportFormat::Html],
        &ordered,
        &meta(&["aaa.com", "bbb.com"]),
        &[],
    )
    .expect("write");
    assert_eq!(written.len(), 3);

    let parsed: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("typo_sniper_report.json")).expect("read"),
    )
    .expect("json");
    let records = parsed["records"].as_array().expect("records array");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["seed"], "aaa.com");
    assert_eq!(records[0]["domain"], "aa.com");
    assert_eq!(records[1]["domain"], "aaa1.com");
    assert_eq!(records[2]["seed"], "bbb.com");
    assert_eq!(parsed["meta"]["seeds"][0], "aaa.com");

    let csv = std::fs::read_to_string(dir.path().join("typo_sniper_report.csv")).expect("csv");
    let mut lines = csv.lines();
    assert!(lines.next().map_or(false, |h| h.starts_with("seed,domain")));
    assert!(lines.next().map_or(false, |l| l.starts_with("aaa.com,aa.com")));
}

#[test]
fn cache_round_trip_preserves_enrichment_payloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = typo_sniper::scan::cache::FileCache::new(dir.path());

    let result = UrlScanResult {
        verdict: Verdict::Suspicious,
        score: 40,
        report_url: Some("https://urlscan.io/result/u/".to_string()),
        screenshot_url: None,
        scan_age_days: 3,
        source: ScanSource::Existing,
    };
    cache
        .put("urlscan", "xample.com:7", &result, 3600)
        .expect("put");
    let got: Option<UrlScanResult> = cache.get("urlscan", "xample.com:7").expect("get");
    assert_eq!(got, Some(result));
}
