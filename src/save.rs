use crate::error::Result;
use crate::job::{Action, ConversionJob, JobStatus, SourceRef};
use crate::util::ensure_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const GENERATED_EXT: &str = "png";
const DECODED_EXT: &str = "rfa";
const GENERATED_FALLBACK: &str = "qrcode";
const DECODED_FALLBACK: &str = "decoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveErrorKind {
    EmptyOrInvalidData,
    WriteFailed,
    Unknown,
}

impl fmt::Display for SaveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SaveErrorKind::EmptyOrInvalidData => "data is empty or invalid",
            SaveErrorKind::WriteFailed => "write failed",
            SaveErrorKind::Unknown => "unknown error",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFailure {
    pub identifier: String,
    pub path: Option<PathBuf>,
    pub kind: SaveErrorKind,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub saved: Vec<PathBuf>,
    pub failures: Vec<SaveFailure>,
}

/// Write every succeeded job's result under `destination`.
///
/// Only succeeded jobs are written; the rest are already accounted for in
/// the batch summary. Only a destination that cannot be created is an error.
pub fn persist(jobs: &[ConversionJob], destination: &Path) -> Result<SaveOutcome> {
    ensure_dir(destination)?;

    let mut outcome = SaveOutcome::default();
    let mut taken = HashSet::new();

    for job in jobs {
        match job.status() {
            JobStatus::Succeeded => {}
            JobStatus::Failed | JobStatus::Cancelled => continue,
            JobStatus::Pending => {
                warn!(job = %job.identifier(), "skipping unsettled job");
                continue;
            }
        }

        let (action, _) = job.intent().resolve();
        let name = unique_name(&mut taken, &output_name(job.source(), action));
        let path = destination.join(&name);

        let bytes = match job.result_bytes() {
            Some(b) if !b.is_empty() => b,
            _ => {
                outcome.failures.push(SaveFailure {
                    identifier: job.identifier(),
                    path: Some(path),
                    kind: SaveErrorKind::EmptyOrInvalidData,
                    detail: None,
                });
                continue;
            }
        };

        match std::fs::write(&path, bytes) {
            Ok(()) => {
                debug!(path = %path.display(), bytes = bytes.len(), "saved");
                outcome.saved.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "save failed");
                outcome.failures.push(SaveFailure {
                    identifier: job.identifier(),
                    path: Some(path),
                    kind: write_error_kind(&e),
                    detail: Some(e.to_string()),
                });
            }
        }
    }

    info!(
        saved = outcome.saved.len(),
        failed = outcome.failures.len(),
        destination = %destination.display(),
        "save finished"
    );
    Ok(outcome)
}

/// File name a job's result is written under, before collision handling.
///
/// Generated images keep the part of the source name before the first dot;
/// decoded payloads keep everything before the last dot.
pub fn output_name(source: &SourceRef, action: Action) -> String {
    let file_name = source
        .path()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (stem, ext, fallback) = match action {
        Action::Generate => (
            file_name.split('.').next().unwrap_or_default(),
            GENERATED_EXT,
            GENERATED_FALLBACK,
        ),
        Action::Decode => (
            file_name
                .rsplit_once('.')
                .map(|(s, _)| s)
                .unwrap_or(&file_name),
            DECODED_EXT,
            DECODED_FALLBACK,
        ),
    };
    let stem = if stem.is_empty() { fallback } else { stem };
    format!("{stem}.{ext}")
}

fn write_error_kind(e: &io::Error) -> SaveErrorKind {
    match e.kind() {
        io::ErrorKind::Other | io::ErrorKind::Interrupted => SaveErrorKind::Unknown,
        _ => SaveErrorKind::WriteFailed,
    }
}

fn unique_name(taken: &mut HashSet<String>, name: &str) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut n = 1;
    loop {
        let candidate = if ext.is_empty() {
            format!("{stem}-{n}")
        } else {
            format!("{stem}-{n}.{ext}")
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
