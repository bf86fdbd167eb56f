//! Report writers.
//!
//! Every writer is a pure function over the ordered record sequence and
//! the scan metadata; none of them reaches back into the pipeline. The
//! tabular writers (CSV, HTML, Excel) share one flattened row shape.

pub mod csv;
pub mod excel;
pub mod html;
pub mod json;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_derive::Serialize;

use crate::scan::errors::FatalError;
use crate::scan::record::{PermutationRecord, ScanMeta};

/// Output formats accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Excel,
    Json,
    Csv,
    Html,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Excel => "xlsx",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Excel => f.write_str("excel"),
            ReportFormat::Json => f.write_str("json"),
            ReportFormat::Csv => f.write_str("csv"),
            ReportFormat::Html => f.write_str("html"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<ReportFormat, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "excel" | "xlsx" => Ok(ReportFormat::Excel),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            "html" => Ok(ReportFormat::Html),
            other => Err(format!("'{}' is not one of excel/json/csv/html", other)),
        }
    }
}

/// Column headers shared by the tabular writers.
pub(crate) const COLUMNS: [&str; 12] = [
    "seed",
    "domain",
    "fuzzer",
    "risk_score",
    "urlscan_verdict",
    "ct_count",
    "http_status",
    "whois_created",
    "registrar",
    "dns_a",
    "ml_risk",
    "ml_verdict",
];

/// One flattened record row for the tabular writers.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReportRow {
    pub seed: String,
    pub domain: String,
    pub fuzzer: String,
    pub risk_score: u8,
    pub urlscan_verdict: String,
    pub ct_count: String,
    pub http_status: String,
    pub whois_created: String,
    pub registrar: String,
    pub dns_a: String,
    pub ml_risk: String,
    pub ml_verdict: String,
}

pub(crate) fn rows(records: &[PermutationRecord]) -> Vec<ReportRow> {
    records
        .iter()
        .map(|record| ReportRow {
            seed: record.seed.clone(),
            domain: record.domain.clone(),
            fuzzer: record.fuzzer.tag().to_string(),
            risk_score: record.risk_score,
            urlscan_verdict: record
                .threat_intel
                .urlscan
                .as_ref()
                .map(|u| format!("{:?}", u.verdict).to_lowercase())
                .unwrap_or_default(),
            ct_count: record
                .threat_intel
                .certificate_transparency
                .as_ref()
                .map(|ct| ct.count.to_string())
                .unwrap_or_default(),
            http_status: record
                .threat_intel
                .http_probe
                .as_ref()
                .and_then(|probe| probe.status_code)
                .map(|status| status.to_string())
                .unwrap_or_default(),
            whois_created: record
                .whois
                .creation_date
                .map(|created| created.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            registrar: record.whois.registrar.clone().unwrap_or_default(),
            dns_a: record.dns.a.join(";"),
            ml_risk: record
                .ml
                .as_ref()
                .map(|ml| ml.risk.to_string())
                .unwrap_or_default(),
            ml_verdict: record
                .ml
                .as_ref()
                .map(|ml| format!("{:?}", ml.verdict).to_lowercase())
                .unwrap_or_default(),
        })
        .collect()
}

/// Write one report file per requested format into `dir`, plus the
/// active-learning sidecar when it is non-empty. Returns the paths
/// written.
pub fn write_reports(
    dir: &Path,
    formats: &[ReportFormat],
    records: &[PermutationRecord],
    meta: &ScanMeta,
    review: &[PermutationRecord],
) -> Result<Vec<PathBuf>, FatalError> {
    std::fs::create_dir_all(dir)?;

    let mut requested = Vec::new();
    for format in formats {
        if !requested.contains(format) {
            requested.push(*format);
        }
    }

    let mut written = Vec::new();
    for format in requested {
        let path = dir.join(format!("typo_sniper_report.{}", format.extension()));
        match format {
            ReportFormat::Json => json::write(&path, records, meta)?,
            ReportFormat::Csv => csv::write(&path, records)?,
            ReportFormat::Html => html::write(&path, records, meta)?,
            ReportFormat::Excel => excel::write(&path, records)?,
        }
        log::info!("wrote {} report to {}", format, path.display());
        written.push(path);
    }

    if !review.is_empty() {
        let path = dir.join("review.json");
        json::write_review(&path, review)?;
        log::info!(
            "wrote {} record(s) for human review to {}",
            review.len(),
            path.display()
        );
        written.push(path);
    }

    Ok(written)
}
