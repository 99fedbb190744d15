use super::{ReportSink, RecordSet, failed};
use crate::error::Result;
use crate::util::now_rfc3339;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Machine-readable dump of the records; images are left out.
pub struct JsonSink;

impl ReportSink for JsonSink {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write(&self, records: &RecordSet, dest: &Path) -> Result<()> {
        let rows = match records {
            RecordSet::Scan(r) => serde_json::to_value(r),
            RecordSet::Batch(r) => serde_json::to_value(r),
        }
        .map_err(|e| failed(dest, e))?;

        let doc = serde_json::json!({
            "generated_at": now_rfc3339(),
            "columns": records.columns(),
            "records": rows,
        });

        let file = std::fs::File::create(dest).map_err(|e| failed(dest, e))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &doc).map_err(|e| failed(dest, e))?;
        out.flush().map_err(|e| failed(dest, e))
    }
}
