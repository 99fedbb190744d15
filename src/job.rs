use crate::classify::UNDETERMINED_NOTE;
use crate::codec::Symbology;
use crate::error::CodecFailure;
use crate::units::Dimensions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Identifier used for direct text input.
pub const RAW_TEXT_ID: &str = "raw_text_input";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRef {
    File(PathBuf),
    Text(String),
}

impl SourceRef {
    pub fn identifier(&self) -> String {
        match self {
            SourceRef::File(p) => p.display().to_string(),
            SourceRef::Text(_) => RAW_TEXT_ID.to_string(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceRef::File(p) => Some(p),
            SourceRef::Text(_) => None,
        }
    }
}

/// Processing intent assigned by classification or by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Generate,
    Decode,
    Undetermined,
}

/// What a job actually does once its intent is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Generate,
    Decode,
}

impl Intent {
    /// Undetermined runs as Generate; the flag tells the caller to annotate it.
    pub fn resolve(self) -> (Action, bool) {
        match self {
            Intent::Generate => (Action::Generate, false),
            Intent::Decode => (Action::Decode, false),
            Intent::Undetermined => (Action::Generate, true),
        }
    }
}

impl From<Action> for Intent {
    fn from(a: Action) -> Self {
        match a {
            Action::Generate => Intent::Generate,
            Action::Decode => Intent::Decode,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Inline(Vec<u8>),
    /// Read by the worker at execution time.
    File(PathBuf),
}

impl Payload {
    pub fn load(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Payload::Inline(b) => Ok(b.clone()),
            Payload::File(p) => std::fs::read(p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    UnsupportedOperation,
    Codec(CodecFailure),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::UnsupportedOperation => f.write_str("UnsupportedOperation"),
            FailureKind::Codec(c) => write!(f, "CodecFailure.{c:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub detail: Option<String>,
}

impl FailureReason {
    pub fn new(kind: FailureKind, detail: impl Into<Option<String>>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Short human-readable explanation.
    pub fn message(&self) -> String {
        let base = match self.kind {
            FailureKind::UnsupportedOperation => "format cannot be generated".to_string(),
            FailureKind::Codec(c) => c.to_string(),
        };
        match &self.detail {
            Some(d) if !d.is_empty() => format!("{base}: {d}"),
            _ => base,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
enum JobState {
    Pending,
    Succeeded(Vec<u8>),
    Failed(FailureReason),
    Cancelled,
}

/// Terminal result handed to [`ConversionJob::settle`].
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded(Vec<u8>),
    Failed(FailureReason),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ConversionJob {
    source: SourceRef,
    intent: Intent,
    pub payload: Payload,
    pub target_format: Symbology,
    pub dimensions: Dimensions,
    pub use_base64: bool,
    annotation: Option<String>,
    state: JobState,
}

impl ConversionJob {
    pub fn new(source: SourceRef, intent: Intent, payload: Payload) -> Self {
        Self {
            source,
            intent,
            payload,
            target_format: Symbology::QRCode,
            dimensions: Dimensions::default(),
            use_base64: true,
            annotation: None,
            state: JobState::Pending,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, intent: Intent) -> Self {
        let path = path.into();
        Self::new(SourceRef::File(path.clone()), intent, Payload::File(path))
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let payload = Payload::Inline(text.clone().into_bytes());
        Self::new(SourceRef::Text(text), Intent::Generate, payload)
    }

    pub fn with_format(mut self, format: Symbology) -> Self {
        self.target_format = format;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_base64(mut self, use_base64: bool) -> Self {
        self.use_base64 = use_base64;
        self
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn identifier(&self) -> String {
        self.source.identifier()
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// User override; replaces whatever classification assigned, including
    /// the undetermined note.
    pub fn override_intent(&mut self, action: Action) {
        self.intent = action.into();
        if self.annotation.as_deref() == Some(UNDETERMINED_NOTE) {
            self.annotation = None;
        }
    }

    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    pub fn annotate(&mut self, note: impl Into<String>) {
        self.annotation = Some(note.into());
    }

    pub fn status(&self) -> JobStatus {
        match self.state {
            JobState::Pending => JobStatus::Pending,
            JobState::Succeeded(_) => JobStatus::Succeeded,
            JobState::Failed(_) => JobStatus::Failed,
            JobState::Cancelled => JobStatus::Cancelled,
        }
    }

    pub fn result_bytes(&self) -> Option<&[u8]> {
        match &self.state {
            JobState::Succeeded(b) => Some(b),
            _ => None,
        }
    }

    pub fn error_detail(&self) -> Option<&FailureReason> {
        match &self.state {
            JobState::Failed(r) => Some(r),
            _ => None,
        }
    }

    /// Move a pending job to its terminal state. Returns false, leaving the
    /// job untouched, if it was already settled.
    pub fn settle(&mut self, outcome: Outcome) -> bool {
        if !matches!(self.state, JobState::Pending) {
            warn!(job = %self.identifier(), status = ?self.status(), "job already settled");
            return false;
        }
        self.state = match outcome {
            Outcome::Succeeded(b) => JobState::Succeeded(b),
            Outcome::Failed(r) => JobState::Failed(r),
            Outcome::Cancelled => JobState::Cancelled,
        };
        true
    }
}
