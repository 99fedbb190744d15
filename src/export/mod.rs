//! Flat report records and the sinks that write them.

pub mod html;
pub mod json;
pub mod xlsx;

use crate::config;
use crate::error::{Error, Result};
use crate::job::JobStatus;
use crate::report::BatchSummary;
use crate::scan::ScanEvent;
use crate::util::display_time;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const SCAN_COLUMNS: &[&str] = &["Time", "Type", "Content", "Width", "Height"];
pub const BATCH_COLUMNS: &[&str] = &["Identifier", "Status", "Reason"];

#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub timestamp: String,
    pub format: String,
    pub content: String,
    pub width: u32,
    pub height: u32,
    /// Encoded frame, turned into embeddable bytes by the sink.
    #[serde(skip)]
    pub image: Arc<[u8]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub identifier: String,
    pub status: JobStatus,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum RecordSet {
    Scan(Vec<ScanRecord>),
    Batch(Vec<BatchRecord>),
}

impl RecordSet {
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RecordSet::Scan(_) => SCAN_COLUMNS,
            RecordSet::Batch(_) => BATCH_COLUMNS,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordSet::Scan(r) => r.len(),
            RecordSet::Batch(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell text per row, in column order.
    pub fn cells(&self) -> Vec<Vec<String>> {
        match self {
            RecordSet::Scan(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.timestamp.clone(),
                        r.format.clone(),
                        r.content.clone(),
                        r.width.to_string(),
                        r.height.to_string(),
                    ]
                })
                .collect(),
            RecordSet::Batch(rows) => rows
                .iter()
                .map(|r| vec![r.identifier.clone(), format!("{:?}", r.status), r.reason.clone()])
                .collect(),
        }
    }

    /// Encoded frame for row `i`, when the set carries images.
    pub fn image(&self, i: usize) -> Option<&[u8]> {
        match self {
            RecordSet::Scan(rows) => rows.get(i).map(|r| &*r.image).filter(|b| !b.is_empty()),
            RecordSet::Batch(_) => None,
        }
    }
}

/// Session log as records, oldest first.
pub fn scan_records(events: &[ScanEvent]) -> Result<RecordSet> {
    if events.is_empty() {
        return Err(Error::NoContent);
    }
    Ok(RecordSet::Scan(
        events
            .iter()
            .map(|e| ScanRecord {
                timestamp: display_time(e.timestamp),
                format: e.format.to_string(),
                content: e.content.clone(),
                width: e.width,
                height: e.height,
                image: Arc::clone(&e.raw_image),
            })
            .collect(),
    ))
}

/// Batch summary as records, in job order.
pub fn batch_records(summary: &BatchSummary) -> Result<RecordSet> {
    if summary.entries.is_empty() {
        return Err(Error::NoContent);
    }
    Ok(RecordSet::Batch(
        summary
            .entries
            .iter()
            .map(|e| BatchRecord {
                identifier: e.identifier.clone(),
                status: e.status,
                reason: e
                    .reason
                    .as_ref()
                    .map(|r| r.message())
                    .or_else(|| e.annotation.clone())
                    .unwrap_or_default(),
            })
            .collect(),
    ))
}

pub trait ReportSink {
    fn name(&self) -> &'static str;

    fn write(&self, records: &RecordSet, dest: &Path) -> Result<()>;
}

/// Hand `records` to `sink`. Empty input never produces a file.
pub fn export(sink: &dyn ReportSink, records: &RecordSet, dest: &Path) -> Result<()> {
    if records.is_empty() {
        return Err(Error::NoContent);
    }
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| failed(dest, e))?;
    }
    sink.write(records, dest)?;
    info!(sink = sink.name(), rows = records.len(), path = %dest.display(), "exported");
    Ok(())
}

/// Pick a sink from the destination's extension.
pub fn sink_for_path(dest: &Path, cfg: &config::Export) -> Result<Box<dyn ReportSink>> {
    let ext = dest
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => Ok(Box::new(html::HtmlSink::new(cfg))),
        "xlsx" => Ok(Box::new(xlsx::XlsxSink::new(cfg))),
        "json" => Ok(Box::new(json::JsonSink)),
        other => Err(Error::InvalidConfig(format!(
            "unsupported export type {other:?} for {}",
            dest.display()
        ))),
    }
}

pub(crate) fn failed(dest: &Path, reason: impl std::fmt::Display) -> Error {
    Error::ExportFailed {
        path: PathBuf::from(dest),
        reason: reason.to_string(),
    }
}
