//! HTML report writer: a self-contained page with the summary header
//! and one sortable-ish table, rendered through handlebars.

use std::path::Path;

use handlebars::Handlebars;

use crate::export::rows;
use crate::scan::errors::FatalError;
use crate::scan::record::{PermutationRecord, ScanMeta};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Typo Sniper Report</title>
<style>
  body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 2rem; color: #222; }
  h1 { margin-bottom: 0.25rem; }
  .meta { color: #666; margin-bottom: 1.5rem; font-size: 0.9rem; }
  table { border-collapse: collapse; width: 100%; font-size: 0.85rem; }
  th, td { border: 1px solid #ddd; padding: 0.4rem 0.6rem; text-align: left; }
  th { background: #f4f4f4; }
  tr:nth-child(even) { background: #fafafa; }
  td.risk-high { background: #fdd; font-weight: bold; }
  td.risk-medium { background: #ffe9cc; }
</style>
</head>
<body>
<h1>Typo Sniper Report</h1>
<div class="meta">
  version {{meta.tool_version}} &middot; started {{meta.started_at}} &middot;
  {{record_count}} record(s) from {{seed_count}} seed(s)
</div>
<table>
<thead>
<tr>
  <th>seed</th><th>domain</th><th>fuzzer</th><th>risk</th>
  <th>urlscan</th><th>ct</th><th>http</th><th>created</th>
  <th>registrar</th><th>dns a</th><th>ml risk</th><th>ml verdict</th>
</tr>
</thead>
<tbody>
{{#each rows}}
<tr>
  <td>{{seed}}</td>
  <td>{{domain}}</td>
  <td>{{fuzzer}}</td>
  <td class="{{risk_class}}">{{risk_score}}</td>
  <td>{{urlscan_verdict}}</td>
  <td>{{ct_count}}</td>
  <td>{{http_status}}</td>
  <td>{{whois_created}}</td>
  <td>{{registrar}}</td>
  <td>{{dns_a}}</td>
  <td>{{ml_risk}}</td>
  <td>{{ml_verdict}}</td>
</tr>
{{/each}}
</tbody>
</table>
</body>
</html>
"#;

pub fn write(
    path: &Path,
    records: &[PermutationRecord],
    meta: &ScanMeta,
) -> Result<(), FatalError> {
    let handlebars = Handlebars::new();

    let rows: Vec<serde_json::Value> = rows(records)
        .into_iter()
        .map(|row| {
            let risk_class = match row.risk_score {
                50..=u8::MAX => "risk-high",
                20..=49 => "risk-medium",
                _ => "",
            };
            let mut value = serde_json::to_value(&row).unwrap_or_default();
            value["risk_class"] = serde_json::Value::String(risk_class.to_string());
            value
        })
        .collect();

    let rendered = handlebars
        .render_template(
            TEMPLATE,
            &serde_json::json!({
                "meta": meta,
                "rows": rows,
                "record_count": records.len(),
                "seed_count": meta.seeds.len(),
            }),
        )
        .map_err(|err| FatalError::Export(format!("html template: {}", err)))?;

    std::fs::write(path, rendered)?;
    Ok(())
}
