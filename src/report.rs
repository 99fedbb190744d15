use crate::job::{ConversionJob, FailureReason, JobStatus};
use crate::save::SaveOutcome;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Saved file names are listed only for batches up to this size.
const MAX_SAVED_NAMES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub identifier: String,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    pub identifier: String,
    pub status: JobStatus,
    pub reason: Option<FailureReason>,
    pub annotation: Option<String>,
}

/// Aggregate over one pipeline run, in original job order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failures: Vec<FailureEntry>,
    pub entries: Vec<JobEntry>,
}

impl BatchSummary {
    pub fn from_jobs(jobs: &[ConversionJob]) -> Self {
        let mut summary = BatchSummary {
            total: jobs.len(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            failures: Vec::new(),
            entries: Vec::with_capacity(jobs.len()),
        };
        for job in jobs {
            let identifier = job.identifier();
            match job.status() {
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                JobStatus::Failed | JobStatus::Pending => {
                    summary.failed += 1;
                }
            }
            let reason = job.error_detail().cloned();
            if let Some(r) = &reason {
                summary.failures.push(FailureEntry {
                    identifier: identifier.clone(),
                    reason: r.clone(),
                });
            }
            summary.entries.push(JobEntry {
                identifier,
                status: job.status(),
                reason,
                annotation: job.annotation().map(str::to_string),
            });
        }
        summary
    }

    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed + self.cancelled == self.total
            && self.failures.len() == self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    /// Failed-items list truncated after `cap` lines.
    Short { cap: usize },
    Full,
}

/// Conversion and save outcomes merged into one user-facing report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub destination: PathBuf,
    pub failed_items: Vec<FailedItem>,
    pub saved_names: Vec<String>,
}

impl FinalReport {
    /// Failed items keep job order: save failures are slotted in at the
    /// succeeded job they belong to.
    pub fn merge(summary: &BatchSummary, save: &SaveOutcome, destination: &Path) -> Self {
        let mut pending = save.failures.iter().peekable();
        let mut failed_items = Vec::with_capacity(summary.failures.len() + save.failures.len());
        for entry in &summary.entries {
            if let Some(reason) = &entry.reason {
                failed_items.push(FailedItem {
                    name: display_name(&entry.identifier),
                    reason: reason.message(),
                });
            } else if entry.status == JobStatus::Succeeded {
                if let Some(f) = pending.next_if(|f| f.identifier == entry.identifier) {
                    failed_items.push(FailedItem {
                        name: display_name(&f.identifier),
                        reason: f.kind.to_string(),
                    });
                }
            }
        }
        failed_items.extend(pending.map(|f| FailedItem {
            name: display_name(&f.identifier),
            reason: f.kind.to_string(),
        }));

        FinalReport {
            total: summary.total,
            succeeded: summary.succeeded.saturating_sub(save.failures.len()),
            failed: summary.failed + save.failures.len(),
            cancelled: summary.cancelled,
            destination: destination.to_path_buf(),
            failed_items,
            saved_names: save
                .saved
                .iter()
                .map(|p| display_name(&p.display().to_string()))
                .collect(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_items.is_empty()
    }

    pub fn render(&self, detail: Detail) -> String {
        let mut msg = format!(
            "Operation complete.\nTotal processed: {}\nSucceeded: {}\nFailed: {}",
            self.total, self.succeeded, self.failed
        );
        if self.cancelled > 0 {
            let _ = write!(msg, "\nCancelled: {}", self.cancelled);
        }
        let _ = write!(msg, "\nDestination: {}", self.destination.display());

        if self.failed_items.is_empty() {
            if self.saved_names.len() > 1 && self.total <= MAX_SAVED_NAMES {
                msg.push_str("\n\n[Files]:\n");
                msg.push_str(&self.saved_names.join("\n"));
            }
            return msg;
        }

        msg.push_str("\n\n[Failed items]:\n");
        let shown = match detail {
            Detail::Short { cap } => cap.min(self.failed_items.len()),
            Detail::Full => self.failed_items.len(),
        };
        for item in &self.failed_items[..shown] {
            let _ = writeln!(msg, "• {} ({})", item.name, item.reason);
        }
        let omitted = self.failed_items.len() - shown;
        if omitted > 0 {
            let _ = write!(msg, "...and {omitted} other files");
        }
        msg.trim_end().to_string()
    }
}

fn display_name(identifier: &str) -> String {
    Path::new(identifier)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| identifier.to_string())
}
