use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure categories reported by a [`crate::codec::Codec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum CodecFailure {
    #[error("unable to recognise a barcode in the image")]
    NotRecognized,
    #[error("image data is empty or cannot be loaded")]
    InvalidImage,
    #[error("payload is empty or invalid")]
    InvalidPayload,
    #[error("symbology is not supported by the codec")]
    UnsupportedFormat,
    #[error("codec internal error")]
    InternalError,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no input selected")]
    NoInputSelected,

    #[error("{format} is read-only and cannot be generated")]
    UnsupportedOperation { format: String },

    #[error("codec failure: {failure}{}", detail_suffix(.detail))]
    Codec {
        failure: CodecFailure,
        detail: Option<String>,
    },

    #[error("failed to write {}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("capture source {source_id:?} unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("a scan session is already active on {source_id:?}")]
    ScanAlreadyActive { source_id: String },

    #[error("export to {} failed: {reason}", path.display())]
    ExportFailed { path: PathBuf, reason: String },

    #[error("nothing to export")]
    NoContent,
}

impl Error {
    pub fn codec(failure: CodecFailure, detail: impl Into<String>) -> Self {
        Error::Codec {
            failure,
            detail: Some(detail.into()),
        }
    }
}

impl From<CodecFailure> for Error {
    fn from(failure: CodecFailure) -> Self {
        Error::Codec {
            failure,
            detail: None,
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) if !d.is_empty() => format!(" ({d})"),
        _ => String::new(),
    }
}
