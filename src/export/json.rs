//! JSON report writer. The layout mirrors the record schema exactly,
//! wrapped in a `meta` + `records` envelope.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::scan::errors::FatalError;
use crate::scan::record::{PermutationRecord, ScanMeta};

pub fn write(
    path: &Path,
    records: &[PermutationRecord],
    meta: &ScanMeta,
) -> Result<(), FatalError> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(
        file,
        &serde_json::json!({
            "meta": meta,
            "records": records,
        }),
    )
    .map_err(|err| FatalError::Export(format!("{}: {}", path.display(), err)))
}

/// Active-learning sidecar: a bare array of records awaiting labels.
pub fn write_review(path: &Path, review: &[PermutationRecord]) -> Result<(), FatalError> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, review)
        .map_err(|err| FatalError::Export(format!("{}: {}", path.display(), err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::permutation::Fuzzer;
    use crate::scan::record::ThreatIntel;
    use crate::scan::resolver::DnsRecords;
    use crate::scan::whois::WhoisRecord;
    use chrono::Utc;

    #[test]
    fn envelope_has_meta_and_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let record = PermutationRecord {
            seed: "example.com".to_string(),
            domain: "example.net".to_string(),
            fuzzer: Fuzzer::TldSwap,
            registered: true,
            dns: DnsRecords::default(),
            whois: WhoisRecord::default(),
            threat_intel: ThreatIntel::default(),
            risk_score: 0,
            ml: None,
        };
        let meta = ScanMeta {
            tool_version: "1.2.3".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            seeds: vec!["example.com".to_string()],
            enabled_features: vec!["risk_scoring".to_string()],
        };
        write(&path, &[record], &meta).expect("write");

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(parsed["meta"]["tool_version"], "1.2.3");
        assert_eq!(parsed["records"][0]["domain"], "example.net");
        assert_eq!(parsed["records"][0]["fuzzer"], "tld-swap");
    }
}
