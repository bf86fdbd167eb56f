//! Excel report writer.

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};

use crate::export::{rows, COLUMNS};
use crate::scan::errors::FatalError;
use crate::scan::record::PermutationRecord;

pub fn write(path: &Path, records: &[PermutationRecord]) -> Result<(), FatalError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, header) in COLUMNS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *header, &bold)
            .map_err(to_export_error)?;
    }

    for (index, row) in rows(records).iter().enumerate() {
        let r = (index + 1) as u32;
        worksheet.write_string(r, 0, &row.seed).map_err(to_export_error)?;
        worksheet
            .write_string(r, 1, &row.domain)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 2, &row.fuzzer)
            .map_err(to_export_error)?;
        worksheet
            .write_number(r, 3, f64::from(row.risk_score))
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 4, &row.urlscan_verdict)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 5, &row.ct_count)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 6, &row.http_status)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 7, &row.whois_created)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 8, &row.registrar)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 9, &row.dns_a)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 10, &row.ml_risk)
            .map_err(to_export_error)?;
        worksheet
            .write_string(r, 11, &row.ml_verdict)
            .map_err(to_export_error)?;
    }

    workbook.save(path).map_err(to_export_error)?;
    Ok(())
}

fn to_export_error(err: rust_xlsxwriter::XlsxError) -> FatalError {
    FatalError::Export(err.to_string())
}
