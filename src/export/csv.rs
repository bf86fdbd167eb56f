//! CSV report writer.

use std::path::Path;

use crate::export::{rows, COLUMNS};
use crate::scan::errors::FatalError;
use crate::scan::record::PermutationRecord;

pub fn write(path: &Path, records: &[PermutationRecord]) -> Result<(), FatalError> {
    let mut writer = ::csv::Writer::from_path(path)
        .map_err(|err| FatalError::Export(format!("{}: {}", path.display(), err)))?;

    writer
        .write_record(COLUMNS)
        .map_err(|err| FatalError::Export(err.to_string()))?;

    for row in rows(records) {
        writer
            .write_record([
                row.seed.as_str(),
                row.domain.as_str(),
                row.fuzzer.as_str(),
                &row.risk_score.to_string(),
                row.urlscan_verdict.as_str(),
                row.ct_count.as_str(),
                row.http_status.as_str(),
                row.whois_created.as_str(),
                row.registrar.as_str(),
                row.dns_a.as_str(),
                row.ml_risk.as_str(),
                row.ml_verdict.as_str(),
            ])
            .map_err(|err| FatalError::Export(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| FatalError::Export(err.to_string()))?;
    Ok(())
}
